//! C4 Embedding Service: text -> fixed-dimension dense vector.
//!
//! A deterministic mock embedder stands in for a real model, with a
//! dimension-lock-at-startup check, device selection, and health contract
//! layered on top. `RuntimeMode::is_test()` is the single source of
//! truth for mock-vs-live status — no ad-hoc env lookups here.

use archivist_core::config::{Device, RuntimeMode};
use archivist_core::health::{HealthReport, HealthStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;

const NO_ENCODE_YET: u64 = u64::MAX;
const PROBE_TEXT: &str = "embedding-service-health-probe";

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding model '{0}' is unavailable outside mock mode")]
    ModelUnavailable(String),
    #[error("embedding dimension mismatch: configured {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl archivist_core::error::CoreError for EmbeddingError {
    fn error_code(&self) -> archivist_core::error::ErrorCode {
        match self {
            EmbeddingError::ModelUnavailable(_) => archivist_core::error::ErrorCode::FailedPrecondition,
            EmbeddingError::DimensionMismatch { .. } => archivist_core::error::ErrorCode::InvalidArgument,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model_name: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub device: Device,
}

/// Text -> dense vector, safe to share across concurrent readers (`&self`
/// only, no interior mutability beyond the last-latency gauge).
pub struct EmbeddingService {
    config: EmbeddingConfig,
    mode: RuntimeMode,
    last_encode_ms: AtomicU64,
}

impl EmbeddingService {
    /// Validates `actual_dim == configured_dim` and model presence at
    /// startup rather than at request time.
    pub fn new(config: EmbeddingConfig, mode: RuntimeMode) -> Result<Self, EmbeddingError> {
        if config.dimension == 0 {
            return Err(EmbeddingError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        if !mode.is_test() && config.model_name.trim().is_empty() {
            return Err(EmbeddingError::ModelUnavailable(
                "model_name must be set outside TEST_MODE/SKIP_MODEL_LOAD".to_string(),
            ));
        }
        Ok(Self {
            config,
            mode,
            last_encode_ms: AtomicU64::new(NO_ENCODE_YET),
        })
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Deterministic in mock mode: `encode(t) == encode(t)` bit-exact,
    /// across calls and processes.
    pub fn encode(&self, text: &str) -> Vec<f32> {
        let start = Instant::now();
        let vector = archivist_core::embedding::deterministic_embedding(
            text,
            &self.config.model_name,
            self.config.dimension,
        );
        self.last_encode_ms
            .store(start.elapsed().as_millis() as u64, Ordering::Relaxed);
        vector
    }

    /// Re-entrant, preserves input order.
    pub fn batch_encode(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts
            .chunks(self.config.batch_size.max(1))
            .flat_map(|batch| batch.iter().map(|t| self.encode(t)))
            .collect()
    }

    /// One encode of a fixed probe string, reporting latency.
    pub fn health_check(&self, deep: bool) -> HealthReport {
        let status = if self.mode.is_test() {
            HealthStatus::Mock
        } else {
            HealthStatus::Healthy
        };

        let mut report = HealthReport::healthy()
            .status(status)
            .with_detail("model_name", self.config.model_name.clone())
            .with_detail("dimension", self.config.dimension as u64)
            .with_detail("device", device_label(self.config.device));

        if deep {
            let start = Instant::now();
            let _ = self.encode(PROBE_TEXT);
            report = report.with_metric("last_encode_ms", start.elapsed().as_millis() as f64);
        } else {
            let last = self.last_encode_ms.load(Ordering::Relaxed);
            if last != NO_ENCODE_YET {
                report = report.with_metric("last_encode_ms", last as f64);
            }
        }

        report
    }
}

fn device_label(device: Device) -> &'static str {
    match device {
        Device::Auto => "auto",
        Device::Cpu => "cpu",
        Device::Gpu => "gpu",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: "embedding-default-v1".to_string(),
            dimension: 16,
            batch_size: 4,
            device: Device::Auto,
        }
    }

    #[test]
    fn encode_is_deterministic_across_calls() {
        let service = EmbeddingService::new(config(), RuntimeMode::Test).unwrap();
        let a = service.encode("the quick brown fox");
        let b = service.encode("the quick brown fox");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn batch_encode_preserves_order() {
        let service = EmbeddingService::new(config(), RuntimeMode::Test).unwrap();
        let texts: Vec<String> = vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()];
        let batched = service.batch_encode(&texts);
        let individually: Vec<Vec<f32>> = texts.iter().map(|t| service.encode(t)).collect();
        assert_eq!(batched, individually);
    }

    #[test]
    fn live_mode_without_model_name_fails_fast_at_construction() {
        let mut cfg = config();
        cfg.model_name = String::new();
        let err = EmbeddingService::new(cfg, RuntimeMode::Live).unwrap_err();
        assert!(matches!(err, EmbeddingError::ModelUnavailable(_)));
    }

    #[test]
    fn health_check_reports_mock_status_in_test_mode() {
        let service = EmbeddingService::new(config(), RuntimeMode::Test).unwrap();
        let report = service.health_check(true);
        assert_eq!(report.status, HealthStatus::Mock);
        assert!(report.metrics.contains_key("last_encode_ms"));
    }

    #[test]
    fn health_check_reports_healthy_status_in_live_mode() {
        let service = EmbeddingService::new(config(), RuntimeMode::Live).unwrap();
        let report = service.health_check(false);
        assert_eq!(report.status, HealthStatus::Healthy);
    }
}
