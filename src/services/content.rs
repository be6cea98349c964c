// ============================================
// Content-Based Filtering Submodel
// ============================================
//
// Term-weighted vector space over item text (title + genres + overview):
// - fit: TF-IDF with a bounded, stop-word-filtered vocabulary frozen at
//   fit time; vectors are L2-normalized so cosine similarity reduces to
//   a dot product
// - recommend: sentiment-weighted average of the user's interacted item
//   vectors forms the profile; candidates are scored by cosine similarity
// - cold start: trending items first, then a random catalog sample;
//   never an error

use crate::models::Item;
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Score reported for fallback (trending/random) candidates.
const FALLBACK_SCORE: f32 = 0.5;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any",
        "are", "as", "at", "be", "because", "been", "before", "being", "below", "between",
        "both", "but", "by", "can", "did", "do", "does", "doing", "down", "during", "each",
        "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here",
        "hers", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "me",
        "more", "most", "my", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
        "or", "other", "our", "out", "over", "own", "s", "same", "she", "so", "some", "such",
        "t", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
        "those", "through", "to", "too", "under", "until", "up", "very", "was", "we", "were",
        "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with", "you",
        "your",
    ]
    .into_iter()
    .collect()
});

/// Content model state. Vocabulary and item vectors are fixed at fit time;
/// items the vectorizer has never seen map to the zero vector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentModel {
    /// term -> column index, fixed at fit time.
    vocabulary: HashMap<String, u32>,
    /// Inverse document frequency per column.
    idf: Vec<f32>,
    /// item_id -> sparse L2-normalized TF-IDF vector, term indices ascending.
    item_vectors: HashMap<String, Vec<(u32, f32)>>,
    /// Catalog order at fit time; drives stable tie-breaking.
    item_order: Vec<String>,
    /// Trending item ids, most popular first (primary cold-start fallback).
    trending: Vec<String>,
}

impl ContentModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trained(&self) -> bool {
        !self.vocabulary.is_empty()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn item_count(&self) -> usize {
        self.item_order.len()
    }

    /// Fit the vector space over the catalog.
    ///
    /// Vocabulary is bounded to `max_terms` by document frequency;
    /// ties are broken alphabetically so fits are deterministic.
    pub fn fit(&mut self, items: &[Item], max_terms: usize) {
        *self = Self::default();
        if items.is_empty() || max_terms == 0 {
            info!("No items to fit content model");
            return;
        }

        let tokenized: Vec<(String, Vec<String>)> = items
            .iter()
            .map(|item| (item.id.clone(), tokenize(&item.content_text())))
            .collect();

        // Document frequency per term.
        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        for (_, tokens) in &tokenized {
            let distinct: HashSet<&str> = tokens.iter().map(String::as_str).collect();
            for term in distinct {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&str, usize)> = document_frequency.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_terms);

        let n_documents = items.len() as f32;
        self.idf = Vec::with_capacity(ranked.len());
        for (column, (term, df)) in ranked.iter().enumerate() {
            self.vocabulary.insert((*term).to_string(), column as u32);
            // Smoothed IDF, never zero.
            self.idf
                .push(((1.0 + n_documents) / (1.0 + *df as f32)).ln() + 1.0);
        }

        for (item_id, tokens) in &tokenized {
            let vector = self.vectorize(tokens);
            self.item_vectors.insert(item_id.clone(), vector);
            self.item_order.push(item_id.clone());
        }

        let mut trending: Vec<(&Item, f32)> = items
            .iter()
            .filter(|item| item.trending)
            .map(|item| (item, item.popularity))
            .collect();
        trending.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        self.trending = trending.into_iter().map(|(item, _)| item.id.clone()).collect();

        info!(
            items = self.item_order.len(),
            vocab = self.vocabulary.len(),
            trending = self.trending.len(),
            "Content model fitted"
        );
    }

    /// Sparse L2-normalized TF-IDF vector for a token list. Tokens outside
    /// the frozen vocabulary are ignored; a fully unseen text yields the
    /// empty (zero) vector rather than an error.
    fn vectorize(&self, tokens: &[String]) -> Vec<(u32, f32)> {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for token in tokens {
            if let Some(&column) = self.vocabulary.get(token.as_str()) {
                *counts.entry(column).or_insert(0.0) += 1.0;
            }
        }

        let mut vector: Vec<(u32, f32)> = counts
            .into_iter()
            .map(|(column, tf)| (column, tf * self.idf[column as usize]))
            .collect();
        vector.sort_by_key(|(column, _)| *column);

        let norm: f32 = vector.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 && norm.is_finite() {
            vector.iter_mut().for_each(|(_, w)| *w /= norm);
            vector
        } else {
            Vec::new()
        }
    }

    /// Sentiment-weighted average of the vectors of interacted items,
    /// normalized to unit length. `None` when the history is empty or the
    /// aggregate degenerates to the zero vector.
    pub fn build_profile(&self, history: &[(String, f32)]) -> Option<Vec<f32>> {
        if history.is_empty() || self.idf.is_empty() {
            return None;
        }

        let mut profile = vec![0.0f32; self.idf.len()];
        let mut total_weight = 0.0f32;
        for (item_id, sentiment) in history {
            if *sentiment <= 0.0 {
                continue;
            }
            if let Some(vector) = self.item_vectors.get(item_id) {
                for &(column, weight) in vector {
                    profile[column as usize] += weight * sentiment;
                }
                total_weight += sentiment;
            }
        }
        if total_weight == 0.0 {
            return None;
        }

        profile.iter_mut().for_each(|w| *w /= total_weight);
        let norm: f32 = profile.iter().map(|w| w * w).sum::<f32>().sqrt();
        if norm > 0.0 && norm.is_finite() {
            profile.iter_mut().for_each(|w| *w /= norm);
            Some(profile)
        } else {
            None
        }
    }

    /// Top-N content recommendations given the user's interaction history
    /// as (item_id, sentiment) pairs.
    ///
    /// Items the user has interacted with are dropped alongside the caller
    /// exclude set. A user without a usable profile falls back to trending,
    /// then to a random sample, never an error.
    pub fn recommend(
        &self,
        history: &[(String, f32)],
        n: usize,
        exclude: &HashSet<String>,
        rng: &mut StdRng,
    ) -> Vec<(String, f32)> {
        if n == 0 || self.item_order.is_empty() {
            return Vec::new();
        }

        let Some(profile) = self.build_profile(history) else {
            debug!(history_len = history.len(), "No usable profile, falling back");
            return self.fallback(n, exclude, rng);
        };

        let interacted: HashSet<&str> = history.iter().map(|(id, _)| id.as_str()).collect();
        let mut scored: Vec<(String, f32)> = Vec::new();
        for item_id in &self.item_order {
            if exclude.contains(item_id) || interacted.contains(item_id.as_str()) {
                continue;
            }
            let Some(vector) = self.item_vectors.get(item_id) else {
                continue;
            };
            // Both sides are unit vectors, so the dot product is the cosine.
            let similarity: f32 = vector
                .iter()
                .map(|&(column, weight)| profile[column as usize] * weight)
                .sum();
            if !similarity.is_finite() {
                continue;
            }
            scored.push((item_id.clone(), similarity.clamp(0.0, 1.0)));
        }

        if scored.is_empty() {
            return self.fallback(n, exclude, rng);
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n);
        scored
    }

    /// Trending items first (popularity order), then a random catalog
    /// sample to fill up to `n`.
    pub fn fallback(
        &self,
        n: usize,
        exclude: &HashSet<String>,
        rng: &mut StdRng,
    ) -> Vec<(String, f32)> {
        let mut picks: Vec<(String, f32)> = Vec::with_capacity(n);
        let mut taken: HashSet<&str> = HashSet::new();

        for item_id in &self.trending {
            if picks.len() >= n {
                break;
            }
            if exclude.contains(item_id) {
                continue;
            }
            if taken.insert(item_id.as_str()) {
                picks.push((item_id.clone(), FALLBACK_SCORE));
            }
        }

        if picks.len() < n {
            let pool: Vec<&String> = self
                .item_order
                .iter()
                .filter(|id| !exclude.contains(*id) && !taken.contains(id.as_str()))
                .collect();
            if !pool.is_empty() {
                let count = (n - picks.len()).min(pool.len());
                for idx in sample(rng, pool.len(), count) {
                    picks.push((pool[idx].clone(), FALLBACK_SCORE));
                }
            }
        }

        picks
    }
}

/// Lowercase alphanumeric tokenization with stop-word and single-character
/// filtering.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 1 && !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn item(id: &str, title: &str, genres: &[&str], overview: &str, trending: bool) -> Item {
        Item {
            id: id.to_string(),
            title: title.to_string(),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            overview: overview.to_string(),
            language: "en".to_string(),
            popularity: if trending { 8.0 } else { 2.0 },
            trending,
            release_year: None,
        }
    }

    fn catalog() -> Vec<Item> {
        vec![
            item(
                "space1",
                "Star Voyage",
                &["Sci-Fi"],
                "A spaceship crew explores distant galaxies and alien worlds",
                false,
            ),
            item(
                "space2",
                "Galaxy Quest",
                &["Sci-Fi"],
                "An alien spaceship and a galaxy-spanning voyage",
                false,
            ),
            item(
                "romance1",
                "Paris Hearts",
                &["Romance"],
                "Two strangers fall in love walking through Paris cafes",
                true,
            ),
            item(
                "cook1",
                "Kitchen Tales",
                &["Documentary"],
                "Chefs cook regional dishes and discuss culinary history",
                false,
            ),
        ]
    }

    #[test]
    fn test_tokenize_filters_stop_words() {
        let tokens = tokenize("The crew of a spaceship is in Space!");
        assert!(tokens.contains(&"crew".to_string()));
        assert!(tokens.contains(&"spaceship".to_string()));
        assert!(!tokens.iter().any(|t| t == "the" || t == "of" || t == "is"));
    }

    #[test]
    fn test_profile_prefers_similar_items() {
        let mut model = ContentModel::new();
        model.fit(&catalog(), 5000);

        // Viewer loved one space film; the other should rank above romance.
        let history = vec![("space1".to_string(), 1.0)];
        let recs = model.recommend(&history, 3, &HashSet::new(), &mut rng());

        assert_eq!(recs[0].0, "space2");
        assert!(recs[0].1 > 0.0);
        // The interacted item never reappears.
        assert!(recs.iter().all(|(id, _)| id != "space1"));
    }

    #[test]
    fn test_scores_stay_in_range() {
        let mut model = ContentModel::new();
        model.fit(&catalog(), 5000);

        let history = vec![("space1".to_string(), 0.9), ("cook1".to_string(), 0.4)];
        let recs = model.recommend(&history, 10, &HashSet::new(), &mut rng());
        assert!(recs.iter().all(|(_, s)| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_empty_history_falls_back_to_trending() {
        let mut model = ContentModel::new();
        model.fit(&catalog(), 5000);

        let recs = model.recommend(&[], 2, &HashSet::new(), &mut rng());
        assert_eq!(recs.len(), 2);
        // Trending item leads the fallback.
        assert_eq!(recs[0].0, "romance1");
        assert_eq!(recs[0].1, 0.5);
    }

    #[test]
    fn test_fallback_respects_exclude() {
        let mut model = ContentModel::new();
        model.fit(&catalog(), 5000);

        let exclude: HashSet<String> = ["romance1".to_string()].into();
        let recs = model.recommend(&[], 4, &exclude, &mut rng());
        assert!(recs.iter().all(|(id, _)| id != "romance1"));
        assert_eq!(recs.len(), 3);
    }

    #[test]
    fn test_unseen_item_history_yields_fallback_not_error() {
        let mut model = ContentModel::new();
        model.fit(&catalog(), 5000);

        // History references an item the vectorizer never saw.
        let history = vec![("added_later".to_string(), 1.0)];
        let recs = model.recommend(&history, 2, &HashSet::new(), &mut rng());
        assert_eq!(recs.len(), 2);
    }

    #[test]
    fn test_vocabulary_bound_is_enforced() {
        let mut model = ContentModel::new();
        model.fit(&catalog(), 3);
        assert!(model.vocab_size() <= 3);
    }
}
