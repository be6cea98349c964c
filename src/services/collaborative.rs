// ============================================
// Collaborative Filtering Submodel
// ============================================
//
// Latent-factor model over the user-item interaction matrix:
// - fit: truncated SVD (randomized subspace iteration) with
//   k = min(50, min(n_users, n_items) - 1) components
// - predict: clamp(dot(user_factor, item_factor), 0, 1)
// - online path: per-interaction single-sample gradient steps, new
//   users/items registered lazily with mean-of-existing factor init
//
// Factor arenas grow per entity (Vec push) instead of copying a dense
// matrix on every insert; rating rows lag behind the item count and
// missing cells read as 0.0.

use crate::error::{EngineError, Result};
use crate::models::clamp_score;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Score reported for cold-start candidates.
pub const NEUTRAL_SCORE: f32 = 0.5;

const MAX_COMPONENTS: usize = 50;
const POWER_ITERATIONS: usize = 4;

/// Append-only bijective map from an external identifier to a dense
/// arena index. Once assigned, an index is never reused or reassigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdIndex<K: Eq + Hash + Clone> {
    forward: HashMap<K, usize>,
    reverse: Vec<K>,
}

impl<K: Eq + Hash + Clone> Default for IdIndex<K> {
    fn default() -> Self {
        Self {
            forward: HashMap::new(),
            reverse: Vec::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> IdIndex<K> {
    pub fn index_of(&self, id: &K) -> Option<usize> {
        self.forward.get(id).copied()
    }

    pub fn id_at(&self, index: usize) -> Option<&K> {
        self.reverse.get(index)
    }

    /// Returns the existing index, or assigns the next free one.
    pub fn get_or_insert(&mut self, id: K) -> usize {
        if let Some(&index) = self.forward.get(&id) {
            return index;
        }
        let index = self.reverse.len();
        self.forward.insert(id.clone(), index);
        self.reverse.push(id);
        index
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// Identifiers in assignment (catalog) order.
    pub fn ids(&self) -> &[K] {
        &self.reverse
    }
}

/// Collaborative filtering model state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollaborativeModel {
    users: IdIndex<Uuid>,
    items: IdIndex<String>,
    /// ratings[u] is user u's dense score row. Rows may be shorter than the
    /// current item count; absent cells read as 0.0.
    ratings: Vec<Vec<f32>>,
    user_factors: Vec<Vec<f32>>,
    item_factors: Vec<Vec<f32>>,
    factor_dim: usize,
}

impl CollaborativeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trained(&self) -> bool {
        self.factor_dim > 0
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn factor_dim(&self) -> usize {
        self.factor_dim
    }

    pub fn item_ids(&self) -> &[String] {
        self.items.ids()
    }

    pub fn rating(&self, user_idx: usize, item_idx: usize) -> f32 {
        self.ratings
            .get(user_idx)
            .and_then(|row| row.get(item_idx))
            .copied()
            .unwrap_or(0.0)
    }

    /// The user's non-zero interactions as (item_id, sentiment) pairs,
    /// in catalog order. Feeds the content profile and the exclude set.
    pub fn user_ratings(&self, user_id: &Uuid) -> Vec<(String, f32)> {
        let Some(user_idx) = self.users.index_of(user_id) else {
            return Vec::new();
        };
        let Some(row) = self.ratings.get(user_idx) else {
            return Vec::new();
        };
        row.iter()
            .enumerate()
            .filter(|(_, &score)| score > 0.0)
            .filter_map(|(item_idx, &score)| {
                self.items.id_at(item_idx).map(|id| (id.clone(), score))
            })
            .collect()
    }

    /// Rebuild the model from the full interaction history.
    ///
    /// Builds the dense user x item score matrix (missing entries = 0),
    /// factorizes it with truncated SVD and derives item factors from the
    /// principal components and user factors from the loadings.
    pub fn fit(&mut self, interactions: &[crate::models::Interaction], rng: &mut StdRng) {
        *self = Self::default();

        for interaction in interactions {
            let user_idx = self.users.get_or_insert(interaction.user_id);
            let item_idx = self.items.get_or_insert(interaction.item_id.clone());
            self.set_rating(user_idx, item_idx, interaction.sentiment);
        }

        let n_users = self.users.len();
        let n_items = self.items.len();
        if n_users == 0 || n_items == 0 {
            info!("No interactions to fit collaborative model");
            return;
        }

        let k = MAX_COMPONENTS.min(n_users.min(n_items).saturating_sub(1));
        if k == 0 {
            warn!(
                n_users = n_users,
                n_items = n_items,
                "Too few entities for factorization, model stays untrained"
            );
            return;
        }

        let mut dense = Array2::<f32>::zeros((n_users, n_items));
        for (user_idx, row) in self.ratings.iter().enumerate() {
            for (item_idx, &score) in row.iter().enumerate() {
                if score != 0.0 {
                    dense[[user_idx, item_idx]] = score;
                }
            }
        }

        let (user_factors, item_factors) = truncated_svd(&dense, k, rng);
        self.user_factors = user_factors
            .rows()
            .into_iter()
            .map(|row| row.to_vec())
            .collect();
        self.item_factors = item_factors
            .rows()
            .into_iter()
            .map(|row| row.to_vec())
            .collect();
        self.factor_dim = k;

        info!(
            n_users = n_users,
            n_items = n_items,
            components = k,
            "Collaborative filtering model fitted"
        );
    }

    /// Predicted affinity in [0,1]. Unknown entities and degenerate
    /// numeric results resolve to the neutral score.
    pub fn predict(&self, user_id: &Uuid, item_id: &str) -> f32 {
        let (Some(user_idx), Some(item_idx)) = (
            self.users.index_of(user_id),
            self.items.index_of(&item_id.to_string()),
        ) else {
            return NEUTRAL_SCORE;
        };

        let (Some(user_factor), Some(item_factor)) = (
            self.user_factors.get(user_idx),
            self.item_factors.get(item_idx),
        ) else {
            return NEUTRAL_SCORE;
        };

        let raw = dot(user_factor, item_factor);
        if raw.is_finite() {
            clamp_score(raw)
        } else {
            NEUTRAL_SCORE
        }
    }

    /// Top-N recommendations for a user.
    ///
    /// Unknown users receive `n` items drawn at random from the known
    /// catalog at the neutral score, an explicit cold-start policy rather
    /// than an error. Ties are broken by catalog order (stable sort).
    pub fn recommend(
        &self,
        user_id: &Uuid,
        n: usize,
        exclude: &HashSet<String>,
        rng: &mut StdRng,
    ) -> Vec<(String, f32)> {
        if n == 0 || self.items.is_empty() {
            return Vec::new();
        }

        if !self.trained() {
            return self.random_sample(n, exclude, rng);
        }

        let user_factor = self
            .users
            .index_of(user_id)
            .and_then(|idx| self.user_factors.get(idx));

        let Some(user_factor) = user_factor else {
            debug!(user_id = %user_id, "Unknown user, cold-start random sample");
            return self.random_sample(n, exclude, rng);
        };

        let mut scored: Vec<(String, f32)> = Vec::with_capacity(self.items.len());
        for (item_idx, item_id) in self.items.ids().iter().enumerate() {
            if exclude.contains(item_id) {
                continue;
            }
            let Some(item_factor) = self.item_factors.get(item_idx) else {
                continue;
            };
            let raw = dot(user_factor, item_factor);
            if !raw.is_finite() {
                continue;
            }
            scored.push((item_id.clone(), clamp_score(raw)));
        }

        if scored.is_empty() {
            return self.random_sample(n, exclude, rng);
        }

        // Stable sort keeps catalog order for equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n);
        scored
    }

    /// Random catalog sample at the neutral score, honoring the exclude set.
    pub fn random_sample(
        &self,
        n: usize,
        exclude: &HashSet<String>,
        rng: &mut StdRng,
    ) -> Vec<(String, f32)> {
        let pool: Vec<&String> = self
            .items
            .ids()
            .iter()
            .filter(|id| !exclude.contains(*id))
            .collect();
        if pool.is_empty() {
            return Vec::new();
        }

        let count = n.min(pool.len());
        sample(rng, pool.len(), count)
            .into_iter()
            .map(|idx| (pool[idx].clone(), NEUTRAL_SCORE))
            .collect()
    }

    /// Register a user, initializing a factor from the mean of existing
    /// user factors (zero vector if none exist). Idempotent.
    pub fn register_user(&mut self, user_id: Uuid) -> usize {
        let before = self.users.len();
        let user_idx = self.users.get_or_insert(user_id);
        if user_idx == before {
            self.user_factors.push(mean_factor(&self.user_factors, self.factor_dim));
            self.ratings.push(Vec::new());
        }
        user_idx
    }

    /// Symmetric treatment for items. No rating-row work is needed:
    /// rows grow lazily on first write to the new column.
    pub fn register_item(&mut self, item_id: String) -> usize {
        let before = self.items.len();
        let item_idx = self.items.get_or_insert(item_id);
        if item_idx == before {
            self.item_factors.push(mean_factor(&self.item_factors, self.factor_dim));
        }
        item_idx
    }

    fn set_rating(&mut self, user_idx: usize, item_idx: usize, score: f32) {
        if self.ratings.len() <= user_idx {
            self.ratings.resize_with(user_idx + 1, Vec::new);
        }
        let row = &mut self.ratings[user_idx];
        if row.len() <= item_idx {
            row.resize(item_idx + 1, 0.0);
        }
        row[item_idx] = score;
    }

    /// Apply one interaction: register unseen entities, write the matrix
    /// cell and take a single gradient step on the bilinear prediction.
    ///
    /// A single step moves the prediction toward the target but carries no
    /// convergence guarantee; large errors or rapid repeats on the same
    /// pair can oscillate.
    pub fn update(
        &mut self,
        user_id: Uuid,
        item_id: &str,
        sentiment: f32,
        learning_rate: f32,
    ) -> Result<()> {
        let user_idx = self.register_user(user_id);
        let item_idx = self.register_item(item_id.to_string());
        self.set_rating(user_idx, item_idx, sentiment);

        let user_len = self.user_factors[user_idx].len();
        let item_len = self.item_factors[item_idx].len();
        if user_len != item_len {
            // Validated before mutation so a malformed factor cannot
            // corrupt state for other users/items.
            return Err(EngineError::DimensionMismatch {
                expected: user_len,
                actual: item_len,
            });
        }
        if user_len == 0 {
            // Untrained model: the rating cell is recorded, factors wait
            // for the first fit.
            return Ok(());
        }

        let predicted = dot(&self.user_factors[user_idx], &self.item_factors[item_idx]);
        let error = sentiment - predicted;
        if !error.is_finite() {
            warn!(user_id = %user_id, item_id = %item_id, "Non-finite prediction, skipping gradient step");
            return Ok(());
        }

        // Both updates use the pre-step factor values.
        let old_user = self.user_factors[user_idx].clone();
        let item_factor = &mut self.item_factors[item_idx];
        for d in 0..user_len {
            self.user_factors[user_idx][d] += learning_rate * error * item_factor[d];
            item_factor[d] += learning_rate * error * old_user[d];
        }

        debug!(
            user_id = %user_id,
            item_id = %item_id,
            error = error,
            "Factors updated from interaction"
        );
        Ok(())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn mean_factor(factors: &[Vec<f32>], dim: usize) -> Vec<f32> {
    let populated: Vec<&Vec<f32>> = factors.iter().filter(|f| f.len() == dim).collect();
    if dim == 0 || populated.is_empty() {
        return vec![0.0; dim];
    }
    let mut mean = vec![0.0f32; dim];
    for factor in &populated {
        for (m, &v) in mean.iter_mut().zip(factor.iter()) {
            *m += v;
        }
    }
    let count = populated.len() as f32;
    mean.iter_mut().for_each(|m| *m /= count);
    mean
}

/// Truncated SVD via randomized subspace iteration.
///
/// Returns (user_factors, item_factors) with
/// matrix ~= user_factors . item_factors^T: user factors are the left
/// singular vectors, item factors carry the singular values.
fn truncated_svd(matrix: &Array2<f32>, k: usize, rng: &mut StdRng) -> (Array2<f32>, Array2<f32>) {
    let (m, n) = matrix.dim();
    let k = k.min(m).min(n);
    if k == 0 {
        return (Array2::zeros((m, 0)), Array2::zeros((n, 0)));
    }

    let omega = Array2::from_shape_fn((n, k), |_| rng.gen_range(-1.0f32..1.0));
    let mut q = orthonormalize(matrix.dot(&omega));

    for _ in 0..POWER_ITERATIONS {
        let z = orthonormalize(matrix.t().dot(&q));
        q = orthonormalize(matrix.dot(&z));
    }

    // Project into the k-dimensional subspace and diagonalize there.
    let b = q.t().dot(matrix); // k x n
    let gram = b.dot(&b.t()); // k x k, symmetric
    let (eigenvalues, eigenvectors) = jacobi_eigh(gram);

    // Order components by decreasing singular value.
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| {
        eigenvalues[b]
            .partial_cmp(&eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut rotation = Array2::<f32>::zeros((k, k));
    for (dst, &src) in order.iter().enumerate() {
        for row in 0..k {
            rotation[[row, dst]] = eigenvectors[[row, src]];
        }
    }

    let user_factors = q.dot(&rotation); // m x k, orthonormal columns
    let item_factors = b.t().dot(&rotation); // n x k, scaled by singular values
    (user_factors, item_factors)
}

/// Modified Gram-Schmidt on the columns. Near-zero columns collapse to
/// zero instead of being normalized into noise.
fn orthonormalize(mut m: Array2<f32>) -> Array2<f32> {
    let cols = m.ncols();
    for j in 0..cols {
        for i in 0..j {
            let proj = m.column(i).dot(&m.column(j));
            let basis = m.column(i).to_owned();
            m.column_mut(j).scaled_add(-proj, &basis);
        }
        let norm = m.column(j).dot(&m.column(j)).sqrt();
        if norm > 1e-8 {
            m.column_mut(j).mapv_inplace(|x| x / norm);
        } else {
            m.column_mut(j).fill(0.0);
        }
    }
    m
}

/// Cyclic Jacobi eigendecomposition for a small symmetric matrix.
/// Returns (eigenvalues, eigenvector columns).
fn jacobi_eigh(mut a: Array2<f32>) -> (Vec<f32>, Array2<f32>) {
    let n = a.nrows();
    let mut v = Array2::<f32>::eye(n);

    for _sweep in 0..30 {
        let mut off_diagonal = 0.0f32;
        for p in 0..n {
            for q in (p + 1)..n {
                off_diagonal += a[[p, q]] * a[[p, q]];
            }
        }
        if off_diagonal.sqrt() < 1e-7 {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() < 1e-12 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for i in 0..n {
                    let aip = a[[i, p]];
                    let aiq = a[[i, q]];
                    a[[i, p]] = c * aip - s * aiq;
                    a[[i, q]] = s * aip + c * aiq;
                }
                for i in 0..n {
                    let api = a[[p, i]];
                    let aqi = a[[q, i]];
                    a[[p, i]] = c * api - s * aqi;
                    a[[q, i]] = s * api + c * aqi;
                }
                for i in 0..n {
                    let vip = v[[i, p]];
                    let viq = v[[i, q]];
                    v[[i, p]] = c * vip - s * viq;
                    v[[i, q]] = s * vip + c * viq;
                }
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[[i, i]]).collect();
    (eigenvalues, v)
}
