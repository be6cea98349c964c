use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog item (film or show) as exposed by the persistence layer.
///
/// Immutable from the engine's perspective: the engine only looks items up,
/// it never mutates or stores them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    /// Genre set, parsed from the pipe-delimited source form.
    pub genres: Vec<String>,
    pub overview: String,
    /// ISO 639-1 language code ("en", "ko", ...).
    pub language: String,
    pub popularity: f32,
    pub trending: bool,
    pub release_year: Option<i32>,
}

impl Item {
    /// Split the pipe-delimited genre string from the raw catalog
    /// ("Action|Adventure|Sci-Fi") into a genre list.
    pub fn parse_genres(raw: &str) -> Vec<String> {
        raw.split('|')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Concatenated text used by the content submodel.
    pub fn content_text(&self) -> String {
        let mut text = String::with_capacity(
            self.title.len() + self.overview.len() + self.genres.len() * 12 + 2,
        );
        text.push_str(&self.title);
        for genre in &self.genres {
            text.push(' ');
            text.push_str(genre);
        }
        text.push(' ');
        text.push_str(&self.overview);
        text
    }
}

/// A recorded user-item interaction. Append-only from the engine's
/// perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: Uuid,
    pub item_id: String,
    /// Sentiment in [0,1]; 1.0 is a fully positive signal.
    pub sentiment: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextData>,
    pub occurred_at: DateTime<Utc>,
}

impl Interaction {
    pub fn new(user_id: Uuid, item_id: impl Into<String>, sentiment: f32) -> Self {
        Self {
            user_id,
            item_id: item_id.into(),
            sentiment,
            context: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: ContextData) -> Self {
        self.context = Some(context);
        self
    }
}

/// Situational context attached to a request or an interaction.
/// Every field is optional; missing fields fall back to neutral encodings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextData {
    pub mood: Option<String>,
    pub time_of_day: Option<String>,
    pub day_of_week: Option<String>,
    pub weather: Option<String>,
    pub age: Option<u8>,
    /// Carried for forward compatibility (weather lookup by place); no
    /// scoring stage reads it yet.
    pub location: Option<String>,
    /// Preferred/request language code; a match against an item's
    /// language earns a rule-table boost.
    pub language: Option<String>,
    pub preferred_genres: Option<Vec<String>>,
}

impl ContextData {
    /// True when no field that influences scoring is set. `location` is
    /// deliberately left out: nothing reads it, so a location-only
    /// context skips the adjustment stage entirely.
    pub fn is_empty(&self) -> bool {
        self.mood.is_none()
            && self.time_of_day.is_none()
            && self.day_of_week.is_none()
            && self.weather.is_none()
            && self.age.is_none()
            && self.language.is_none()
            && self.preferred_genres.is_none()
    }
}

/// A single ranked recommendation. Ephemeral: produced per request,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item_id: String,
    pub score: f32,
}

/// Engine state summary for inspection endpoints and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub users: usize,
    pub items: usize,
    pub factor_dim: usize,
    pub vocab_size: usize,
    pub trained: bool,
    pub snapshot_at: Option<DateTime<Utc>>,
}

/// Clamp a score to the [0,1] contract enforced at every stage boundary.
/// Non-finite values collapse to 0.0 so they can never leak to callers.
pub fn clamp_score(score: f32) -> f32 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_genres() {
        let genres = Item::parse_genres("Action|Adventure| Sci-Fi ");
        assert_eq!(genres, vec!["Action", "Adventure", "Sci-Fi"]);

        assert!(Item::parse_genres("").is_empty());
        assert_eq!(Item::parse_genres("Drama"), vec!["Drama"]);
    }

    #[test]
    fn test_context_with_only_location_counts_as_empty() {
        let context = ContextData {
            location: Some("Lisbon".to_string()),
            ..Default::default()
        };
        assert!(context.is_empty());

        let context = ContextData {
            mood: Some("happy".to_string()),
            ..Default::default()
        };
        assert!(!context.is_empty());
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(0.5), 0.5);
        assert_eq!(clamp_score(1.7), 1.0);
        assert_eq!(clamp_score(-0.2), 0.0);
        assert_eq!(clamp_score(f32::NAN), 0.0);
        assert_eq!(clamp_score(f32::INFINITY), 0.0);
    }

    #[test]
    fn test_content_text_joins_fields() {
        let item = Item {
            id: "m1".to_string(),
            title: "Alien".to_string(),
            genres: vec!["Horror".to_string(), "Sci-Fi".to_string()],
            overview: "A crew encounters something.".to_string(),
            language: "en".to_string(),
            popularity: 9.1,
            trending: false,
            release_year: Some(1979),
        };

        let text = item.content_text();
        assert!(text.contains("Alien"));
        assert!(text.contains("Horror"));
        assert!(text.contains("crew"));
    }
}
