//! Pipeline coordinator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the ingest pipeline and its accumulators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Lines per work-queue chunk. Default: 25_000.
    pub chunk_size: Option<usize>,
    /// Worker thread count. 0 = available hardware parallelism.
    pub workers: Option<usize>,
    /// Bounded work-queue depth, in chunks. Default: 2 × workers.
    pub queue_depth: Option<usize>,
    /// Whether the connection join is active. Default: true.
    pub connection_join: Option<bool>,
    /// Run the cheap auth pre-pass so usernames are linked before client
    /// metadata arrives. Default: true (only applies when the join is
    /// active).
    pub auth_prepass: Option<bool>,
    /// Soft cap on live connection-join state before emergency eviction.
    /// Default: 5_000_000.
    pub connection_soft_cap: Option<usize>,
    /// Probability that a new connection is sampled for lifetime tracking.
    /// Default: 0.1.
    pub lifetime_sample_rate: Option<f64>,
    /// RNG seed for the lifetime-sampling coin. Default: entropy.
    pub rng_seed: Option<u64>,
    /// Percentile rank reported from reservoirs. Default: 95.0.
    pub percentile_rank: Option<f64>,
    /// How many slowest-planning records the report keeps. Default: 25.
    pub slow_planning_top_n: Option<usize>,
}

impl PipelineConfig {
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(25_000).max(1)
    }

    /// Worker count; 0 or absent means hardware parallelism.
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }

    pub fn effective_queue_depth(&self) -> usize {
        self.queue_depth
            .unwrap_or_else(|| self.effective_workers() * 2)
            .max(1)
    }

    pub fn effective_connection_join(&self) -> bool {
        self.connection_join.unwrap_or(true)
    }

    pub fn effective_auth_prepass(&self) -> bool {
        self.auth_prepass.unwrap_or(true)
    }

    pub fn effective_connection_soft_cap(&self) -> usize {
        self.connection_soft_cap.unwrap_or(5_000_000)
    }

    pub fn effective_lifetime_sample_rate(&self) -> f64 {
        self.lifetime_sample_rate.unwrap_or(0.1).clamp(0.0, 1.0)
    }

    pub fn effective_percentile_rank(&self) -> f64 {
        self.percentile_rank.unwrap_or(95.0).clamp(0.0, 100.0)
    }

    pub fn effective_slow_planning_top_n(&self) -> usize {
        self.slow_planning_top_n.unwrap_or(25).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.effective_chunk_size(), 25_000);
        assert!(config.effective_workers() >= 1);
        assert_eq!(config.effective_connection_soft_cap(), 5_000_000);
        assert!((config.effective_lifetime_sample_rate() - 0.1).abs() < f64::EPSILON);
        assert!((config.effective_percentile_rank() - 95.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_workers_means_auto() {
        let config = PipelineConfig {
            workers: Some(0),
            ..Default::default()
        };
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn sample_rate_clamped() {
        let config = PipelineConfig {
            lifetime_sample_rate: Some(7.5),
            ..Default::default()
        };
        assert!((config.effective_lifetime_sample_rate() - 1.0).abs() < f64::EPSILON);
    }
}
