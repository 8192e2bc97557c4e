//! Action token decoding and de-normalization
//!
//! OpenVLA emits one token per action dimension. The last `n_bins` ids of the
//! base vocabulary encode a uniform discretization of [-1, 1]; decoded values
//! are then mapped back to robot units using per-dataset quantile statistics.

use serde::Deserialize;
use std::collections::BTreeMap;
use vla_infer_core::{Error, Result};

/// Maps action token ids to normalized values in [-1, 1]
#[derive(Debug, Clone)]
pub struct ActionTokenizer {
    vocab_size: usize,
    bin_centers: Vec<f32>,
}

impl ActionTokenizer {
    /// Build a tokenizer with `n_bins` uniform bins over a base vocabulary of `vocab_size`
    pub fn new(n_bins: usize, vocab_size: usize) -> Self {
        let n_bins = n_bins.max(2);
        let step = 2.0 / (n_bins - 1) as f64;
        let bins: Vec<f64> = (0..n_bins).map(|i| -1.0 + step * i as f64).collect();
        let bin_centers = bins
            .windows(2)
            .map(|w| ((w[0] + w[1]) / 2.0) as f32)
            .collect();

        Self {
            vocab_size,
            bin_centers,
        }
    }

    /// Centers of the discretization bins
    pub fn bin_centers(&self) -> &[f32] {
        &self.bin_centers
    }

    /// Decode generated token ids into normalized actions
    pub fn decode(&self, token_ids: &[u32]) -> Vec<f32> {
        let last = self.bin_centers.len() as i64 - 1;
        token_ids
            .iter()
            .map(|&id| {
                let discretized = self.vocab_size as i64 - i64::from(id);
                let index = (discretized - 1).clamp(0, last) as usize;
                self.bin_centers[index]
            })
            .collect()
    }
}

/// Statistics of one dataset
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetStatistics {
    pub action: ActionStatistics,
}

/// Quantile statistics for the action space of one dataset
#[derive(Debug, Clone, Deserialize)]
pub struct ActionStatistics {
    /// 1st percentile per dimension
    pub q01: Vec<f32>,

    /// 99th percentile per dimension
    pub q99: Vec<f32>,

    /// Dimensions to de-normalize; absent means all of them
    #[serde(default)]
    pub mask: Option<Vec<bool>>,
}

impl ActionStatistics {
    /// Number of action dimensions
    pub fn dim(&self) -> usize {
        self.q01.len()
    }

    /// Map normalized actions back to dataset units.
    ///
    /// Masked-out dimensions (typically the gripper) pass through unchanged.
    pub fn unnormalize(&self, normalized: &[f32]) -> Vec<f32> {
        normalized
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                let masked = self
                    .mask
                    .as_ref()
                    .map_or(true, |mask| mask.get(i).copied().unwrap_or(true));
                match (masked, self.q01.get(i), self.q99.get(i)) {
                    (true, Some(&low), Some(&high)) => 0.5 * (value + 1.0) * (high - low) + low,
                    _ => value,
                }
            })
            .collect()
    }
}

/// Dataset statistics keyed by dataset name
pub type NormStats = BTreeMap<String, DatasetStatistics>;

/// Look up the action statistics for `unnorm_key`
pub fn action_statistics<'a>(
    norm_stats: &'a NormStats,
    unnorm_key: &str,
) -> Result<&'a ActionStatistics> {
    norm_stats
        .get(unnorm_key)
        .map(|stats| &stats.action)
        .ok_or_else(|| {
            let available: Vec<&str> = norm_stats.keys().map(String::as_str).collect();
            Error::inference(format!(
                "unnorm_key '{}' has no dataset statistics, available keys: {}",
                unnorm_key,
                available.join(", ")
            ))
        })
}
