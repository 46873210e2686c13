//! Health reporting.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

/// Result of a health check: a verdict, the reasons behind a failing one,
/// and numeric details for operators.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    pub details: Map<String, Value>,
}

impl HealthReport {
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            ..Self::default()
        }
    }

    /// Adds a detail entry.
    #[must_use]
    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Marks the report unhealthy.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.healthy = false;
        self.reasons.push(reason.into());
    }

    /// Folds `other` into this report under `prefix`.
    pub fn merge(&mut self, prefix: &str, other: HealthReport) {
        if !other.healthy {
            self.healthy = false;
            self.reasons
                .extend(other.reasons.into_iter().map(|r| format!("{prefix}: {r}")));
        }
        self.details
            .insert(prefix.to_string(), Value::Object(other.details));
    }
}

/// Implemented by components that can report their health.
pub trait HealthCheck {
    fn health_check(&self) -> HealthReport;
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
