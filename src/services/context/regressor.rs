// Online linear regressor for the learned contextual adjustment.
//
// Plain SGD on squared loss with a small L2 penalty, supporting both batch
// fitting at training time and per-interaction `partial_fit` steps on the
// live engine.

use serde::{Deserialize, Serialize};
use tracing::debug;

const L2_PENALTY: f32 = 1e-4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineRegressor {
    weights: Vec<f32>,
    bias: f32,
    learning_rate: f32,
    samples_seen: u64,
}

impl OnlineRegressor {
    pub fn new(dim: usize, learning_rate: f32) -> Self {
        Self {
            weights: vec![0.0; dim],
            bias: 0.0,
            learning_rate,
            samples_seen: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.weights.len()
    }

    pub fn trained(&self) -> bool {
        self.samples_seen > 0
    }

    /// Raw linear prediction. `None` when the input dimensionality does
    /// not match or the output is non-finite.
    pub fn predict(&self, features: &[f32]) -> Option<f32> {
        if features.len() != self.weights.len() {
            return None;
        }
        let raw: f32 = self
            .weights
            .iter()
            .zip(features.iter())
            .map(|(w, x)| w * x)
            .sum::<f32>()
            + self.bias;
        raw.is_finite().then_some(raw)
    }

    /// One SGD step toward `target`. Mismatched or degenerate inputs are
    /// skipped so a malformed sample cannot corrupt the weights.
    pub fn partial_fit(&mut self, features: &[f32], target: f32) {
        if features.len() != self.weights.len() || !target.is_finite() {
            debug!(
                expected = self.weights.len(),
                actual = features.len(),
                "Skipping regressor update"
            );
            return;
        }
        let Some(predicted) = self.predict(features) else {
            return;
        };

        let error = predicted - target;
        if !error.is_finite() {
            return;
        }
        for (weight, &x) in self.weights.iter_mut().zip(features.iter()) {
            *weight -= self.learning_rate * (error * x + L2_PENALTY * *weight);
        }
        self.bias -= self.learning_rate * error;
        self.samples_seen += 1;
    }

    /// Batch fit: several passes of SGD over the sample set.
    pub fn fit(&mut self, samples: &[(Vec<f32>, f32)], passes: usize) {
        for _ in 0..passes {
            for (features, target) in samples {
                self.partial_fit(features, *target);
            }
        }
    }
}
