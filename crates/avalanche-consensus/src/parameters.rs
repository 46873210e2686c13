//! Consensus parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_ms;
use crate::{ConsensusError, Result};

/// Parameters for Snow consensus protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Sample size (k) - number of validators to poll
    pub k: usize,

    /// Quorum size (alpha) - votes needed for a successful poll
    pub alpha: usize,

    /// Consecutive successes needed to finalize an item with no conflicts
    pub beta_virtuous: usize,

    /// Consecutive successes needed to finalize an item with conflicts
    pub beta_rogue: usize,

    /// Polls issued at once while items are processing
    pub concurrent_repolls: usize,

    /// Processing items above which no new items are built
    pub optimal_processing: usize,

    /// Processing items above which the instance reports unhealthy
    pub max_outstanding_items: usize,

    /// Age above which a processing item reports unhealthy
    #[serde(with = "duration_ms")]
    pub max_item_processing_time: Duration,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            k: 20,
            alpha: 15,
            beta_virtuous: 15,
            beta_rogue: 20,
            concurrent_repolls: 4,
            optimal_processing: 10,
            max_outstanding_items: 256,
            max_item_processing_time: Duration::from_secs(30),
        }
    }
}

impl Parameters {
    /// Creates new parameters with the given values.
    pub fn new(k: usize, alpha: usize, beta_virtuous: usize, beta_rogue: usize) -> Self {
        Self {
            k,
            alpha,
            beta_virtuous,
            beta_rogue,
            concurrent_repolls: 1,
            ..Default::default()
        }
    }

    /// Validates the parameters.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ConsensusError::InvalidParameters(msg));

        if self.k == 0 {
            return invalid("k = 0: fails the condition that: 0 < k".into());
        }
        if self.alpha <= self.k / 2 {
            return invalid(format!(
                "k = {}, alpha = {}: fails the condition that: k/2 < alpha",
                self.k, self.alpha
            ));
        }
        if self.alpha > self.k {
            return invalid(format!(
                "k = {}, alpha = {}: fails the condition that: alpha <= k",
                self.k, self.alpha
            ));
        }
        if self.beta_virtuous == 0 {
            return invalid("beta_virtuous = 0: fails the condition that: 0 < beta_virtuous".into());
        }
        if self.beta_rogue < self.beta_virtuous {
            return invalid(format!(
                "beta_virtuous = {}, beta_rogue = {}: fails the condition that: beta_virtuous <= beta_rogue",
                self.beta_virtuous, self.beta_rogue
            ));
        }
        if self.concurrent_repolls == 0 {
            return invalid(
                "concurrent_repolls = 0: fails the condition that: 0 < concurrent_repolls".into(),
            );
        }
        if self.concurrent_repolls > self.beta_rogue {
            return invalid(format!(
                "concurrent_repolls = {}, beta_rogue = {}: fails the condition that: concurrent_repolls <= beta_rogue",
                self.concurrent_repolls, self.beta_rogue
            ));
        }
        if self.optimal_processing == 0 {
            return invalid(
                "optimal_processing = 0: fails the condition that: 0 < optimal_processing".into(),
            );
        }
        if self.max_outstanding_items == 0 {
            return invalid(
                "max_outstanding_items = 0: fails the condition that: 0 < max_outstanding_items"
                    .into(),
            );
        }
        if self.max_item_processing_time.is_zero() {
            return invalid(
                "max_item_processing_time = 0: fails the condition that: 0 < max_item_processing_time"
                    .into(),
            );
        }
        Ok(())
    }
}
