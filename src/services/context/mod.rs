// ============================================
// Contextual Adjustment
// ============================================
//
// Re-scores a ranked candidate list given situational context. Two
// interchangeable strategies, chosen explicitly at construction:
// - Learned: linear regression over the encoded context, delta amplified
//   by `context_alpha`
// - Rules: additive genre-conditioned boost table (fallback whenever no
//   trained regression component exists)
//
// Both clamp every adjusted score to [0,1] and re-sort descending.

pub mod encoder;
pub mod regressor;
pub mod rules;

pub use encoder::{encode_context, CONTEXT_FEATURES};
pub use regressor::OnlineRegressor;
pub use rules::RuleTable;

use crate::models::{clamp_score, ContextData, Item};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContextStrategy {
    Learned(OnlineRegressor),
    Rules(RuleTable),
}

impl ContextStrategy {
    pub fn is_learned(&self) -> bool {
        matches!(self, ContextStrategy::Learned(_))
    }

    /// Re-score candidates under the given context and re-sort descending.
    /// `items` supplies genre/language metadata; candidates without
    /// metadata keep their base score.
    pub fn adjust(
        &self,
        candidates: Vec<(String, f32)>,
        context: &ContextData,
        items: &HashMap<String, Item>,
        alpha: f32,
    ) -> Vec<(String, f32)> {
        let mut adjusted: Vec<(String, f32)> = match self {
            ContextStrategy::Learned(regressor) => {
                let context_features = encode_context(context);
                candidates
                    .into_iter()
                    .map(|(item_id, base)| {
                        let mut features = Vec::with_capacity(1 + context_features.len());
                        features.push(base);
                        features.extend_from_slice(&context_features);

                        let score = match regressor.predict(&features) {
                            Some(predicted) => {
                                let predicted = predicted.clamp(0.0, 1.0);
                                // Amplify the contextual delta.
                                clamp_score(base + (predicted - base) * (1.0 + alpha))
                            }
                            None => base,
                        };
                        (item_id, score)
                    })
                    .collect()
            }
            ContextStrategy::Rules(table) => candidates
                .into_iter()
                .map(|(item_id, base)| {
                    let score = match items.get(&item_id) {
                        Some(item) => {
                            let delta = table.adjustment(&item.genres, &item.language, context);
                            clamp_score(base + delta)
                        }
                        None => {
                            debug!(item_id = %item_id, "No metadata for candidate, keeping base score");
                            base
                        }
                    };
                    (item_id, score)
                })
                .collect(),
        };

        adjusted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        adjusted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, genres: &[&str]) -> Item {
        Item {
            id: id.to_string(),
            title: id.to_string(),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            overview: String::new(),
            language: "en".to_string(),
            popularity: 1.0,
            trending: false,
            release_year: None,
        }
    }

    fn metadata(entries: &[(&str, &[&str])]) -> HashMap<String, Item> {
        entries
            .iter()
            .map(|(id, genres)| ((*id).to_string(), item(id, genres)))
            .collect()
    }

    #[test]
    fn test_happy_mood_ranks_comedy_over_drama() {
        // Equal base scores, happy mood: Comedy must win.
        let strategy = ContextStrategy::Rules(RuleTable::default());
        let items = metadata(&[("a", &["Comedy"]), ("b", &["Drama"])]);
        let context = ContextData {
            mood: Some("happy".to_string()),
            ..Default::default()
        };

        let adjusted = strategy.adjust(
            vec![("a".to_string(), 0.6), ("b".to_string(), 0.6)],
            &context,
            &items,
            0.5,
        );

        assert_eq!(adjusted[0].0, "a");
        assert!(adjusted[0].1 > adjusted[1].1);
    }

    #[test]
    fn test_rule_scores_are_clamped() {
        let strategy = ContextStrategy::Rules(RuleTable::default());
        let items = metadata(&[("a", &["Comedy", "Adventure", "Action"])]);
        let context = ContextData {
            mood: Some("happy".to_string()),
            day_of_week: Some("Saturday".to_string()),
            weather: Some("sunny".to_string()),
            age: Some(25),
            preferred_genres: Some(vec!["Comedy".to_string()]),
            language: Some("en".to_string()),
            ..Default::default()
        };

        let adjusted = strategy.adjust(vec![("a".to_string(), 0.9)], &context, &items, 0.5);
        assert_eq!(adjusted[0].1, 1.0);
    }

    #[test]
    fn test_missing_metadata_keeps_base_score() {
        let strategy = ContextStrategy::Rules(RuleTable::default());
        let context = ContextData {
            mood: Some("happy".to_string()),
            ..Default::default()
        };

        let adjusted = strategy.adjust(
            vec![("ghost".to_string(), 0.4)],
            &context,
            &HashMap::new(),
            0.5,
        );
        assert_eq!(adjusted[0].1, 0.4);
    }

    #[test]
    fn test_learned_mode_amplifies_delta() {
        // Regressor trained to always predict ~0.8 regardless of input.
        let mut regressor = OnlineRegressor::new(1 + CONTEXT_FEATURES, 0.05);
        let features = vec![0.0; 1 + CONTEXT_FEATURES];
        for _ in 0..500 {
            regressor.partial_fit(&features, 0.8);
        }

        let strategy = ContextStrategy::Learned(regressor);
        let adjusted = strategy.adjust(
            vec![("a".to_string(), 0.5)],
            &ContextData::default(),
            &HashMap::new(),
            0.5,
        );

        // base 0.5, predicted ~0.8 -> 0.5 + 0.3 * 1.5 = ~0.95, clamped to <= 1.
        assert!(adjusted[0].1 > 0.85);
        assert!(adjusted[0].1 <= 1.0);
    }

    #[test]
    fn test_output_is_sorted_descending() {
        let strategy = ContextStrategy::Rules(RuleTable::default());
        let items = metadata(&[("a", &["Drama"]), ("b", &["Comedy"]), ("c", &["Horror"])]);
        let context = ContextData {
            mood: Some("happy".to_string()),
            ..Default::default()
        };

        let adjusted = strategy.adjust(
            vec![
                ("a".to_string(), 0.5),
                ("b".to_string(), 0.5),
                ("c".to_string(), 0.5),
            ],
            &context,
            &items,
            0.5,
        );

        assert!(adjusted.windows(2).all(|w| w[0].1 >= w[1].1));
        assert_eq!(adjusted[0].0, "b");
    }
}
