// Rule-based contextual adjustment.
//
// Additive, genre-conditioned boosts and penalties applied when no trained
// regression component is available. The magnitudes are hand-tuned policy
// constants with no derivation; they live in `RuleTable` so deployments can
// retune them without a code change.

use crate::models::ContextData;
use serde::{Deserialize, Serialize};

/// Boost/penalty magnitudes for every rule factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTable {
    /// Happy mood: + for Comedy/Adventure.
    pub happy_boost: f32,
    /// Happy mood: - for Drama/Horror.
    pub happy_penalty: f32,
    /// Sad mood: + for Drama/Romance.
    pub sad_boost: f32,
    /// Sad mood: - for Comedy/Action.
    pub sad_penalty: f32,
    /// Evening/night: + for Horror/Thriller.
    pub late_hours_boost: f32,
    /// Morning: + for Documentary/Family.
    pub morning_boost: f32,
    /// Friday/Saturday: + for Action/Adventure.
    pub weekend_boost: f32,
    /// Sunday/Monday: + for Documentary/Drama.
    pub week_start_boost: f32,
    /// Rainy/snowy: + for Drama/Romance.
    pub gloomy_weather_boost: f32,
    /// Sunny/clear: + for Adventure/Action.
    pub bright_weather_boost: f32,
    /// Under 13: + for Family/Animation.
    pub child_boost: f32,
    /// Under 13: - for Horror/Thriller.
    pub child_penalty: f32,
    /// 13-17: + for Adventure/Sci-Fi.
    pub teen_boost: f32,
    /// 18-29: + for Action/Comedy.
    pub young_adult_boost: f32,
    /// 30-49: + for Drama/Thriller.
    pub adult_boost: f32,
    /// 50+: + for Documentary/Drama.
    pub senior_boost: f32,
    /// Item language equals the requested/preferred language.
    pub language_match_boost: f32,
    /// Item carries one of the explicitly preferred genres.
    pub preferred_genre_boost: f32,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            happy_boost: 0.15,
            happy_penalty: 0.10,
            sad_boost: 0.15,
            sad_penalty: 0.05,
            late_hours_boost: 0.10,
            morning_boost: 0.10,
            weekend_boost: 0.10,
            week_start_boost: 0.05,
            gloomy_weather_boost: 0.10,
            bright_weather_boost: 0.10,
            child_boost: 0.20,
            child_penalty: 0.30,
            teen_boost: 0.15,
            young_adult_boost: 0.10,
            adult_boost: 0.10,
            senior_boost: 0.10,
            language_match_boost: 0.25,
            preferred_genre_boost: 0.15,
        }
    }
}

impl RuleTable {
    /// Additive adjustment for one item under the given context. The caller
    /// clamps `base + adjustment` to [0,1].
    pub fn adjustment(
        &self,
        genres: &[String],
        item_language: &str,
        context: &ContextData,
    ) -> f32 {
        let mut delta = 0.0f32;
        let has = |genre: &str| genres.iter().any(|g| g.eq_ignore_ascii_case(genre));

        match context.mood.as_deref() {
            Some("happy") => {
                if has("Comedy") || has("Adventure") {
                    delta += self.happy_boost;
                }
                if has("Drama") || has("Horror") {
                    delta -= self.happy_penalty;
                }
            }
            Some("sad") => {
                if has("Drama") || has("Romance") {
                    delta += self.sad_boost;
                }
                if has("Comedy") || has("Action") {
                    delta -= self.sad_penalty;
                }
            }
            _ => {}
        }

        match context.time_of_day.as_deref() {
            Some("evening") | Some("night") => {
                if has("Horror") || has("Thriller") {
                    delta += self.late_hours_boost;
                }
            }
            Some("morning") => {
                if has("Documentary") || has("Family") {
                    delta += self.morning_boost;
                }
            }
            _ => {}
        }

        match context.day_of_week.as_deref() {
            Some("Friday") | Some("Saturday") => {
                if has("Action") || has("Adventure") {
                    delta += self.weekend_boost;
                }
            }
            Some("Sunday") | Some("Monday") => {
                if has("Documentary") || has("Drama") {
                    delta += self.week_start_boost;
                }
            }
            _ => {}
        }

        match context.weather.as_deref() {
            Some("rainy") | Some("snowy") => {
                if has("Drama") || has("Romance") {
                    delta += self.gloomy_weather_boost;
                }
            }
            Some("sunny") | Some("clear") => {
                if has("Adventure") || has("Action") {
                    delta += self.bright_weather_boost;
                }
            }
            _ => {}
        }

        if let Some(age) = context.age {
            if age < 13 {
                if has("Family") || has("Animation") {
                    delta += self.child_boost;
                }
                if has("Horror") || has("Thriller") {
                    delta -= self.child_penalty;
                }
            } else if age < 18 {
                if has("Adventure") || has("Sci-Fi") {
                    delta += self.teen_boost;
                }
            } else if age < 30 {
                if has("Action") || has("Comedy") {
                    delta += self.young_adult_boost;
                }
            } else if age < 50 {
                if has("Drama") || has("Thriller") {
                    delta += self.adult_boost;
                }
            } else if has("Documentary") || has("Drama") {
                delta += self.senior_boost;
            }
        }

        if let Some(language) = context.language.as_deref() {
            if !item_language.is_empty() && item_language.eq_ignore_ascii_case(language) {
                delta += self.language_match_boost;
            }
        }

        if let Some(preferred) = &context.preferred_genres {
            if preferred.iter().any(|p| has(p)) {
                delta += self.preferred_genre_boost;
            }
        }

        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genres(names: &[&str]) -> Vec<String> {
        names.iter().map(|g| g.to_string()).collect()
    }

    #[test]
    fn test_happy_mood_splits_comedy_and_drama() {
        let table = RuleTable::default();
        let context = ContextData {
            mood: Some("happy".to_string()),
            ..Default::default()
        };

        let comedy = table.adjustment(&genres(&["Comedy"]), "en", &context);
        let drama = table.adjustment(&genres(&["Drama"]), "en", &context);

        assert!(comedy > 0.0);
        assert!(drama < 0.0);
        assert!(comedy > drama);
    }

    #[test]
    fn test_child_strongly_penalizes_horror() {
        let table = RuleTable::default();
        let context = ContextData {
            age: Some(9),
            ..Default::default()
        };

        assert_eq!(table.adjustment(&genres(&["Horror"]), "en", &context), -0.30);
        assert_eq!(
            table.adjustment(&genres(&["Animation", "Family"]), "en", &context),
            0.20
        );
    }

    #[test]
    fn test_language_match_boost() {
        let table = RuleTable::default();
        let context = ContextData {
            language: Some("ko".to_string()),
            ..Default::default()
        };

        assert_eq!(table.adjustment(&genres(&["Drama"]), "ko", &context), 0.25);
        assert_eq!(table.adjustment(&genres(&["Drama"]), "en", &context), 0.0);
    }

    #[test]
    fn test_factors_accumulate() {
        let table = RuleTable::default();
        let context = ContextData {
            mood: Some("happy".to_string()),
            day_of_week: Some("Friday".to_string()),
            weather: Some("sunny".to_string()),
            ..Default::default()
        };

        // Adventure: happy +0.15, Friday +0.10, sunny +0.10.
        let delta = table.adjustment(&genres(&["Adventure"]), "en", &context);
        assert!((delta - 0.35).abs() < 1e-6);
    }

    #[test]
    fn test_preferred_genre_boost() {
        let table = RuleTable::default();
        let context = ContextData {
            preferred_genres: Some(vec!["Sci-Fi".to_string()]),
            ..Default::default()
        };

        assert_eq!(
            table.adjustment(&genres(&["Sci-Fi", "Action"]), "en", &context),
            0.15
        );
        assert_eq!(table.adjustment(&genres(&["Romance"]), "en", &context), 0.0);
    }
}
