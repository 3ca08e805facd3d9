use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Uniform status vocabulary shared by the content store, embedding
/// service, and vector index, and composed by the health aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Mock,
    Degraded,
    Error,
}

impl HealthStatus {
    /// Exit code mapping; `TEST_MODE` forces a healthy exit regardless
    /// of the underlying status.
    pub fn exit_code(self, force_healthy: bool) -> u8 {
        if force_healthy {
            return 0;
        }
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Mock | HealthStatus::Degraded => 1,
            HealthStatus::Error => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    #[serde(default)]
    pub hints: Vec<String>,
}

impl HealthReport {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            details: HashMap::new(),
            metrics: HashMap::new(),
            hints: Vec::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_metric(mut self, key: &str, value: f64) -> Self {
        self.metrics.insert(key.to_string(), value);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn status(mut self, status: HealthStatus) -> Self {
        self.status = status;
        self
    }
}
