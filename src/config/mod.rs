use crate::services::context::RuleTable;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration.
///
/// Every policy constant in the scoring pipeline lives here: blend weights,
/// the contextual amplification factor, the online learning rate and the
/// rule-based boost table are all tunable rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Weight of the collaborative score in the hybrid blend.
    pub cf_weight: f32,
    /// Weight of the content score in the hybrid blend.
    pub cb_weight: f32,
    /// Amplification applied to the learned contextual delta:
    /// adjusted = base + (predicted - base) * (1 + context_alpha).
    pub context_alpha: f32,
    /// Learning rate for single-sample factor updates.
    pub learning_rate: f32,
    /// Upper bound on the TF-IDF vocabulary.
    pub max_vocab_terms: usize,
    /// Per-submodel compute budget; on expiry the ranker falls back to
    /// trending candidates instead of blocking the request.
    pub compute_budget_ms: u64,
    /// Seed for the randomized fallback paths. `None` seeds from entropy.
    pub rng_seed: Option<u64>,
    /// Location of the model snapshot file.
    pub snapshot_path: PathBuf,
    /// Boost/penalty magnitudes for the rule-based contextual adjustment.
    #[serde(default)]
    pub rules: RuleTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cf_weight: 0.6,
            cb_weight: 0.4,
            context_alpha: 0.5,
            learning_rate: 0.01,
            max_vocab_terms: 5000,
            compute_budget_ms: 250,
            rng_seed: None,
            snapshot_path: PathBuf::from("./models/engine_snapshot.json"),
            rules: RuleTable::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = Self::default();

        Ok(Self {
            cf_weight: env_parse("RECO_CF_WEIGHT", defaults.cf_weight)?,
            cb_weight: env_parse("RECO_CB_WEIGHT", defaults.cb_weight)?,
            context_alpha: env_parse("RECO_CONTEXT_ALPHA", defaults.context_alpha)?,
            learning_rate: env_parse("RECO_LEARNING_RATE", defaults.learning_rate)?,
            max_vocab_terms: env_parse("RECO_MAX_VOCAB_TERMS", defaults.max_vocab_terms)?,
            compute_budget_ms: env_parse("RECO_COMPUTE_BUDGET_MS", defaults.compute_budget_ms)?,
            rng_seed: match std::env::var("RECO_RNG_SEED") {
                Ok(raw) => Some(raw.parse()?),
                Err(_) => None,
            },
            snapshot_path: std::env::var("RECO_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_path),
            rules: RuleTable::default(),
        })
    }

    /// Validate weight sanity before building an engine.
    pub fn validate(&self) -> Result<(), String> {
        if self.cf_weight < 0.0 || self.cb_weight < 0.0 {
            return Err("blend weights must be non-negative".to_string());
        }
        if self.cf_weight == 0.0 && self.cb_weight == 0.0 {
            return Err("at least one blend weight must be positive".to_string());
        }
        if self.learning_rate <= 0.0 || self.learning_rate > 1.0 {
            return Err(format!(
                "learning rate must be in (0, 1], got {}",
                self.learning_rate
            ));
        }
        if self.max_vocab_terms == 0 {
            return Err("vocabulary bound must be positive".to_string());
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, T::Err> {
    match std::env::var(key) {
        Ok(raw) => raw.parse(),
        Err(_) => Ok(default),
    }
}
