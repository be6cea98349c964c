// ============================================
// Hybrid Scorer/Ranker + Online Update Manager
// ============================================
//
// Single authoritative in-process model instance behind a readers-writer
// lock: many concurrent recommendation reads, serialized interaction
// writes. Submodel corpus scans run on blocking threads under the shared
// lock and are awaited with a compute budget; on expiry the ranker falls
// back to trending/random candidates instead of blocking the request.
//
// Blend policy (intentional, preserved from the original system): an item
// present in only one submodel's list receives only that weighted term.
// The score is additive-and-conditional, not a presence-normalized
// average.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{clamp_score, ContextData, Interaction, Item, ModelInfo, Recommendation};
use crate::services::collaborative::CollaborativeModel;
use crate::services::content::ContentModel;
use crate::services::context::{encode_context, ContextStrategy, OnlineRegressor, CONTEXT_FEATURES};
use crate::services::persistence::{self, Snapshot, SNAPSHOT_VERSION};
use crate::store::{CatalogStore, InteractionStore};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Minimum context-bearing interactions before the learned adjustment
/// strategy is preferred over the rule table.
const MIN_CONTEXT_SAMPLES: usize = 16;
const CONTEXT_TRAINING_PASSES: usize = 5;
const CONTEXT_LEARNING_RATE: f32 = 0.01;

/// All mutable model state, swapped as a unit under the exclusive lock.
#[derive(Debug, Clone)]
pub struct ModelState {
    pub cf: CollaborativeModel,
    pub cb: ContentModel,
    pub context: ContextStrategy,
    pub snapshot_at: Option<DateTime<Utc>>,
}

impl ModelState {
    fn empty(rules: crate::services::context::RuleTable) -> Self {
        Self {
            cf: CollaborativeModel::new(),
            cb: ContentModel::new(),
            context: ContextStrategy::Rules(rules),
            snapshot_at: None,
        }
    }
}

/// Hybrid recommendation engine.
///
/// Owns its factor arenas and identifier mappings explicitly; constructed
/// with injected store handles and a snapshot path (no module-level
/// globals).
pub struct RecommendationEngine {
    state: Arc<RwLock<ModelState>>,
    catalog: Arc<dyn CatalogStore>,
    interactions: Arc<dyn InteractionStore>,
    config: EngineConfig,
    rng: Arc<Mutex<StdRng>>,
}

impl RecommendationEngine {
    pub fn new(
        config: EngineConfig,
        catalog: Arc<dyn CatalogStore>,
        interactions: Arc<dyn InteractionStore>,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = ModelState::empty(config.rules.clone());
        Self {
            state: Arc::new(RwLock::new(state)),
            catalog,
            interactions,
            config,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// Fit all submodels from scratch. The new state is built off-lock and
    /// swapped in atomically, so concurrent reads keep answering against
    /// the previous model until the swap.
    pub async fn train(&self, interactions: Vec<Interaction>, items: Vec<Item>) -> Result<()> {
        let state = Arc::clone(&self.state);
        let rng = Arc::clone(&self.rng);
        let rules = self.config.rules.clone();
        let max_vocab = self.config.max_vocab_terms;

        task::spawn_blocking(move || {
            let mut cf = CollaborativeModel::new();
            {
                let mut rng = lock_mutex(&rng);
                cf.fit(&interactions, &mut rng);
            }

            let mut cb = ContentModel::new();
            cb.fit(&items, max_vocab);

            // A learned contextual component only exists when enough
            // context-bearing interactions are available; otherwise the
            // rule table answers.
            let samples: Vec<(Vec<f32>, f32)> = interactions
                .iter()
                .filter_map(|interaction| {
                    interaction.context.as_ref().map(|context| {
                        let mut features = Vec::with_capacity(1 + CONTEXT_FEATURES);
                        features.push(cf.predict(&interaction.user_id, &interaction.item_id));
                        features.extend(encode_context(context));
                        (features, interaction.sentiment)
                    })
                })
                .collect();

            let context = if samples.len() >= MIN_CONTEXT_SAMPLES {
                let mut regressor =
                    OnlineRegressor::new(1 + CONTEXT_FEATURES, CONTEXT_LEARNING_RATE);
                regressor.fit(&samples, CONTEXT_TRAINING_PASSES);
                info!(samples = samples.len(), "Contextual regressor trained");
                ContextStrategy::Learned(regressor)
            } else {
                debug!(
                    samples = samples.len(),
                    "Not enough context samples, using rule-based adjustment"
                );
                ContextStrategy::Rules(rules)
            };

            let mut guard = write_lock(&state);
            let snapshot_at = guard.snapshot_at;
            *guard = ModelState {
                cf,
                cb,
                context,
                snapshot_at,
            };
        })
        .await
        .map_err(|err| EngineError::Internal(err.to_string()))?;

        info!("Recommendation engine trained");
        Ok(())
    }

    /// Top-N recommendations for a user.
    ///
    /// Never fails on unknown users or items: every degenerate path
    /// resolves to a documented fallback. Returned scores are in [0,1]
    /// and the list never contains an excluded or already-seen item.
    pub async fn get_recommendations(
        &self,
        user_id: Uuid,
        n: usize,
        context: Option<&ContextData>,
        exclude_items: Option<&[String]>,
    ) -> Result<Vec<Recommendation>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        // Effective exclude set: caller excludes plus everything the user
        // has already interacted with.
        let mut exclude: HashSet<String> = exclude_items
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default();
        match self.interactions.user_history(user_id).await {
            Ok(history) => exclude.extend(history),
            Err(err) => warn!(user_id = %user_id, "History lookup failed: {err}"),
        }

        let candidate_count = n.saturating_mul(2);

        // Submodels run sequentially so the shared RNG is consumed in a
        // deterministic order under a fixed seed.
        let cf_recs = self
            .with_budget({
                let state = Arc::clone(&self.state);
                let rng = Arc::clone(&self.rng);
                let exclude = exclude.clone();
                move || {
                    let guard = read_lock(&state);
                    let mut rng = lock_mutex(&rng);
                    guard.cf.recommend(&user_id, candidate_count, &exclude, &mut rng)
                }
            })
            .await
            .unwrap_or_default();

        let cb_recs = self
            .with_budget({
                let state = Arc::clone(&self.state);
                let rng = Arc::clone(&self.rng);
                let exclude = exclude.clone();
                move || {
                    let guard = read_lock(&state);
                    let mut rng = lock_mutex(&rng);
                    let history = guard.cf.user_ratings(&user_id);
                    guard.cb.recommend(&history, candidate_count, &exclude, &mut rng)
                }
            })
            .await
            .unwrap_or_default();

        let mut ranked = blend(
            cf_recs,
            cb_recs,
            self.config.cf_weight,
            self.config.cb_weight,
        );
        ranked.truncate(candidate_count);

        if ranked.is_empty() {
            // Both submodels timed out or came back empty: best-effort
            // trending/random candidates instead of an empty answer.
            ranked = self
                .with_budget({
                    let state = Arc::clone(&self.state);
                    let rng = Arc::clone(&self.rng);
                    let exclude = exclude.clone();
                    move || {
                        let guard = read_lock(&state);
                        let mut rng = lock_mutex(&rng);
                        let picks = guard.cb.fallback(candidate_count, &exclude, &mut rng);
                        if picks.is_empty() {
                            guard.cf.random_sample(candidate_count, &exclude, &mut rng)
                        } else {
                            picks
                        }
                    }
                })
                .await
                .unwrap_or_default();
        }

        if let Some(context) = context.filter(|c| !c.is_empty()) {
            ranked = self.apply_context(ranked, context).await;
        }

        // Defense in depth: re-filter against a possibly stale candidate
        // set, clamp at the final boundary, cut to n.
        let recommendations: Vec<Recommendation> = ranked
            .into_iter()
            .filter(|(item_id, _)| !exclude.contains(item_id))
            .take(n)
            .map(|(item_id, score)| Recommendation {
                item_id,
                score: clamp_score(score),
            })
            .collect();

        debug!(
            user_id = %user_id,
            requested = n,
            returned = recommendations.len(),
            "Recommendations generated"
        );
        Ok(recommendations)
    }

    async fn apply_context(
        &self,
        candidates: Vec<(String, f32)>,
        context: &ContextData,
    ) -> Vec<(String, f32)> {
        let ids: Vec<String> = candidates.iter().map(|(id, _)| id.clone()).collect();
        let metadata: HashMap<String, Item> = match self.catalog.get_items(&ids).await {
            Ok(items) => items.into_iter().map(|item| (item.id.clone(), item)).collect(),
            Err(err) => {
                warn!("Item metadata lookup failed, skipping genre rules: {err}");
                HashMap::new()
            }
        };

        let strategy = read_lock(&self.state).context.clone();
        strategy.adjust(candidates, context, &metadata, self.config.context_alpha)
    }

    /// Record one interaction: registers unseen users/items, writes the
    /// score cell, applies a single gradient step and (in learned mode)
    /// one regressor step, then hands the interaction to the append-only
    /// store. Store failures are logged, not surfaced: the in-memory
    /// update has already happened.
    pub async fn record_interaction(
        &self,
        user_id: Uuid,
        item_id: &str,
        sentiment: f32,
        context: Option<ContextData>,
    ) -> Result<()> {
        if !sentiment.is_finite() || !(0.0..=1.0).contains(&sentiment) {
            return Err(EngineError::InvalidScore(sentiment));
        }

        let state = Arc::clone(&self.state);
        let item = item_id.to_string();
        let learning_rate = self.config.learning_rate;
        let update_context = context.clone();

        task::spawn_blocking(move || -> Result<()> {
            let mut guard = write_lock(&state);
            let model = &mut *guard;
            model.cf.update(user_id, &item, sentiment, learning_rate)?;

            if let (Some(context), ContextStrategy::Learned(regressor)) =
                (update_context.as_ref(), &mut model.context)
            {
                let mut features = Vec::with_capacity(1 + CONTEXT_FEATURES);
                features.push(model.cf.predict(&user_id, &item));
                features.extend(encode_context(context));
                regressor.partial_fit(&features, sentiment);
            }
            Ok(())
        })
        .await
        .map_err(|err| EngineError::Internal(err.to_string()))??;

        let interaction = Interaction {
            user_id,
            item_id: item_id.to_string(),
            sentiment,
            context,
            occurred_at: Utc::now(),
        };
        if let Err(err) = self.interactions.append(interaction).await {
            warn!(user_id = %user_id, item_id = %item_id, "Interaction append failed: {err}");
        }

        Ok(())
    }

    /// Current predicted affinity for a (user, item) pair.
    pub async fn predict(&self, user_id: Uuid, item_id: &str) -> f32 {
        read_lock(&self.state).cf.predict(&user_id, item_id)
    }

    /// Checkpoint all engine state to the configured snapshot path.
    ///
    /// The snapshot is cloned under the shared lock and written off-lock,
    /// so no interaction write ever waits on disk. A failed save is
    /// logged; in-memory state remains authoritative.
    pub async fn save_models(&self) -> Result<()> {
        let state = Arc::clone(&self.state);
        let path = self.config.snapshot_path.clone();

        let saved_at = task::spawn_blocking(move || -> Result<DateTime<Utc>> {
            let snapshot = {
                let guard = read_lock(&state);
                Snapshot {
                    version: SNAPSHOT_VERSION,
                    saved_at: Utc::now(),
                    cf: guard.cf.clone(),
                    cb: guard.cb.clone(),
                    context: guard.context.clone(),
                }
            };
            let saved_at = snapshot.saved_at;
            persistence::save_snapshot(&path, &snapshot)?;
            Ok(saved_at)
        })
        .await
        .map_err(|err| EngineError::Internal(err.to_string()))?;

        match saved_at {
            Ok(saved_at) => {
                write_lock(&self.state).snapshot_at = Some(saved_at);
                Ok(())
            }
            Err(err) => {
                warn!("Model snapshot save failed: {err}");
                Err(err)
            }
        }
    }

    /// Restore all engine state from the snapshot path.
    ///
    /// Returns `true` on success. Any failure is logged and leaves the
    /// engine in a valid, empty state (never partially populated), and
    /// the cold-start policies keep answering requests.
    pub async fn load_models(&self) -> bool {
        let path = self.config.snapshot_path.clone();
        let loaded = task::spawn_blocking(move || persistence::load_snapshot(&path)).await;

        match loaded {
            Ok(Ok(snapshot)) => {
                let mut guard = write_lock(&self.state);
                *guard = ModelState {
                    cf: snapshot.cf,
                    cb: snapshot.cb,
                    context: snapshot.context,
                    snapshot_at: Some(snapshot.saved_at),
                };
                info!(
                    users = guard.cf.user_count(),
                    items = guard.cf.item_count(),
                    "Model snapshot restored"
                );
                true
            }
            Ok(Err(err)) => {
                warn!("Model snapshot load failed, starting untrained: {err}");
                *write_lock(&self.state) = ModelState::empty(self.config.rules.clone());
                false
            }
            Err(err) => {
                warn!("Model snapshot load task failed: {err}");
                *write_lock(&self.state) = ModelState::empty(self.config.rules.clone());
                false
            }
        }
    }

    pub async fn model_info(&self) -> ModelInfo {
        let guard = read_lock(&self.state);
        ModelInfo {
            users: guard.cf.user_count(),
            items: guard.cf.item_count(),
            factor_dim: guard.cf.factor_dim(),
            vocab_size: guard.cb.vocab_size(),
            trained: guard.cf.trained() || guard.cb.trained(),
            snapshot_at: guard.snapshot_at,
        }
    }

    /// Run a submodel scan on a blocking thread, bounded by the configured
    /// compute budget. On expiry the scan keeps running in the background
    /// but the caller falls back immediately.
    async fn with_budget<T, F>(&self, scan: F) -> Option<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let budget = Duration::from_millis(self.config.compute_budget_ms);
        match timeout(budget, task::spawn_blocking(scan)).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                warn!("Submodel scan panicked: {err}");
                None
            }
            Err(_) => {
                warn!(budget_ms = self.config.compute_budget_ms, "Submodel scan exceeded budget, falling back");
                None
            }
        }
    }
}

/// Additive-and-conditional blend of submodel candidate lists.
///
/// CF entries contribute `cf_weight * score`; CB entries add
/// `cb_weight * score` on top or stand alone. Descending by blended
/// score, item id as the deterministic tie-break.
fn blend(
    cf_recs: Vec<(String, f32)>,
    cb_recs: Vec<(String, f32)>,
    cf_weight: f32,
    cb_weight: f32,
) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::with_capacity(cf_recs.len() + cb_recs.len());
    for (item_id, score) in cf_recs {
        scores.insert(item_id, cf_weight * score);
    }
    for (item_id, score) in cb_recs {
        *scores.entry(item_id).or_insert(0.0) += cb_weight * score;
    }

    let mut ranked: Vec<(String, f32)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked
}

fn read_lock(lock: &RwLock<ModelState>) -> std::sync::RwLockReadGuard<'_, ModelState> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock(lock: &RwLock<ModelState>) -> std::sync::RwLockWriteGuard<'_, ModelState> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_mutex<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_asymmetry_scenario() {
        // X only in CF at 0.8 -> 0.48; Y only in CB at 0.9 -> 0.36;
        // Z in both at 0.5/0.5 -> 0.5. Expected order: Z > X > Y.
        let cf = vec![("x".to_string(), 0.8), ("z".to_string(), 0.5)];
        let cb = vec![("y".to_string(), 0.9), ("z".to_string(), 0.5)];

        let ranked = blend(cf, cb, 0.6, 0.4);

        assert_eq!(ranked[0].0, "z");
        assert!((ranked[0].1 - 0.5).abs() < 1e-6);
        assert_eq!(ranked[1].0, "x");
        assert!((ranked[1].1 - 0.48).abs() < 1e-6);
        assert_eq!(ranked[2].0, "y");
        assert!((ranked[2].1 - 0.36).abs() < 1e-6);
    }

    #[test]
    fn test_blend_ties_break_on_item_id() {
        let cf = vec![("b".to_string(), 0.5), ("a".to_string(), 0.5)];
        let ranked = blend(cf, Vec::new(), 0.6, 0.4);
        assert_eq!(ranked[0].0, "a");
        assert_eq!(ranked[1].0, "b");
    }

    #[test]
    fn test_blend_empty_inputs() {
        assert!(blend(Vec::new(), Vec::new(), 0.6, 0.4).is_empty());
    }
}
