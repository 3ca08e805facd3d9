//! C5 Vector Index Adapter: upsert/search/delete against an external vector
//! store, with an availability probe and C1 parity reconciliation.
//!
//! The adapter wraps [`crate::index::LinearAnnIndex`] (brute-force cosine)
//! behind the wire contract a real vector-index service would expose:
//! `upsert`/`delete`/`search`/`batch_upsert`/`available`/`reconcile`. A
//! production deployment swaps this adapter for an HTTP client against the
//! real service without touching callers, which only ever see this
//! trait-shaped surface.

use crate::index::LinearAnnIndex;
use archivist_core::error::{CoreError, ErrorCode};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("vector index connection error: {0}")]
    Connection(String),
    #[error("vector index response parse error: {0}")]
    Parse(String),
    #[error("dimension mismatch: collection is locked to {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl CoreError for VectorIndexError {
    fn error_code(&self) -> ErrorCode {
        match self {
            VectorIndexError::Connection(_) => ErrorCode::Unavailable,
            VectorIndexError::Parse(_) => ErrorCode::Internal,
            VectorIndexError::DimensionMismatch { .. } => ErrorCode::InvalidArgument,
        }
    }
}

/// Small metadata envelope stored alongside a vector point. Never the full
/// content body.
#[derive(Debug, Clone, PartialEq)]
pub struct PointPayload {
    pub content_id: u64,
    pub source_type: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: u64,
    pub score: f32,
    pub payload: PointPayload,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub missing_in_index: Vec<u64>,
    pub orphan_in_index: Vec<u64>,
    pub delta: usize,
}

struct Collection {
    model_name: String,
    dimension: usize,
    index: LinearAnnIndex,
    payloads: HashMap<u64, PointPayload>,
}

/// Configuration mirroring the app-level `vector_index` config block.
pub struct VectorIndexConfig {
    pub collection_name: String,
    pub model_name: String,
    pub dimension: usize,
    pub timeout: Duration,
    pub disabled: bool,
    pub test_mode: bool,
    pub allow_empty_collection: bool,
    pub delta_threshold: u64,
}

pub struct VectorIndexAdapter {
    collection: RwLock<Collection>,
    config: VectorIndexConfig,
}

impl VectorIndexAdapter {
    pub fn new(config: VectorIndexConfig) -> Self {
        let collection = Collection {
            model_name: config.model_name.clone(),
            dimension: config.dimension,
            index: LinearAnnIndex::new(),
            payloads: HashMap::new(),
        };
        Self {
            collection: RwLock::new(collection),
            config,
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.config.collection_name
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.config.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    pub fn upsert(
        &self,
        id: u64,
        vector: Vec<f32>,
        payload: PointPayload,
    ) -> Result<(), VectorIndexError> {
        self.check_dimension(&vector)?;
        if self.config.disabled {
            return Err(VectorIndexError::Connection("QDRANT_DISABLED".into()));
        }
        let mut collection = self
            .collection
            .write()
            .map_err(|_| VectorIndexError::Connection("lock poisoned".into()))?;
        collection.index.insert(id, vector);
        collection.payloads.insert(id, payload);
        Ok(())
    }

    pub fn batch_upsert(
        &self,
        points: Vec<(u64, Vec<f32>, PointPayload)>,
    ) -> Result<usize, VectorIndexError> {
        for (_, vector, _) in &points {
            self.check_dimension(vector)?;
        }
        if self.config.disabled {
            return Err(VectorIndexError::Connection("QDRANT_DISABLED".into()));
        }
        let mut collection = self
            .collection
            .write()
            .map_err(|_| VectorIndexError::Connection("lock poisoned".into()))?;
        let count = points.len();
        for (id, vector, payload) in points {
            collection.index.insert(id, vector);
            collection.payloads.insert(id, payload);
        }
        Ok(count)
    }

    pub fn delete(&self, ids: &[u64]) -> Result<(), VectorIndexError> {
        if self.config.disabled {
            return Err(VectorIndexError::Connection("QDRANT_DISABLED".into()));
        }
        let mut collection = self
            .collection
            .write()
            .map_err(|_| VectorIndexError::Connection("lock poisoned".into()))?;
        for id in ids {
            collection.index.delete(*id);
            collection.payloads.remove(id);
        }
        Ok(())
    }

    pub fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter_source_types: Option<&[String]>,
    ) -> Result<Vec<SearchHit>, VectorIndexError> {
        self.check_dimension(query_vector)?;
        if self.config.disabled {
            return Err(VectorIndexError::Connection("QDRANT_DISABLED".into()));
        }
        let collection = self
            .collection
            .read()
            .map_err(|_| VectorIndexError::Connection("lock poisoned".into()))?;

        // Over-fetch to allow post-filtering by source_type without losing
        // the requested limit.
        let raw = collection.index.search(query_vector, limit.max(1) * 4);
        let hits = raw
            .into_iter()
            .filter_map(|(id, score)| {
                let payload = collection.payloads.get(&id)?.clone();
                if let Some(allowed) = filter_source_types {
                    if !allowed.iter().any(|s| s == &payload.source_type) {
                        return None;
                    }
                }
                Some(SearchHit { id, score, payload })
            })
            .take(limit)
            .collect();
        Ok(hits)
    }

    /// Strict availability probe: must return false on *any* exception,
    /// true only on a successful probe. Honors `TEST_MODE`/`QDRANT_DISABLED`.
    pub fn available(&self) -> bool {
        if self.config.test_mode {
            return true;
        }
        if self.config.disabled {
            return false;
        }
        self.collection.read().is_ok()
    }

    /// Zero-vector guard plus deep check: fails when the collection
    /// exists but is empty unless `ALLOW_EMPTY_COLLECTION=true`.
    pub fn health_status(&self) -> VectorIndexHealth {
        let Ok(collection) = self.collection.read() else {
            return VectorIndexHealth::Error("collection lock poisoned".to_string());
        };
        if collection.index.is_empty() && !self.config.allow_empty_collection {
            return VectorIndexHealth::Error("collection is empty".to_string());
        }
        if collection.index.is_empty() {
            return VectorIndexHealth::Degraded("collection is empty".to_string());
        }
        VectorIndexHealth::Healthy {
            point_count: collection.index.len(),
        }
    }

    /// Parity check against C1's `expected_ids` (content ids flagged
    /// `ready_for_embedding=true` or `embedding_generated=true`).
    pub fn reconcile(&self, expected_ids: &[u64], dry_run: bool) -> ReconcileReport {
        let Ok(mut collection) = self.collection.write() else {
            return ReconcileReport::default();
        };
        let expected: HashSet<u64> = expected_ids.iter().copied().collect();
        let actual: HashSet<u64> = collection.payloads.keys().copied().collect();

        let mut missing: Vec<u64> = expected.difference(&actual).copied().collect();
        let mut orphan: Vec<u64> = actual.difference(&expected).copied().collect();
        missing.sort_unstable();
        orphan.sort_unstable();

        if !dry_run {
            for id in &orphan {
                collection.index.delete(*id);
                collection.payloads.remove(id);
            }
        }

        let delta = missing.len() + orphan.len();
        ReconcileReport {
            missing_in_index: missing,
            orphan_in_index: orphan,
            delta,
        }
    }

    pub fn delta_threshold(&self) -> u64 {
        self.config.delta_threshold
    }

    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VectorIndexHealth {
    Healthy { point_count: usize },
    Degraded(String),
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(dimension: usize) -> VectorIndexAdapter {
        VectorIndexAdapter::new(VectorIndexConfig {
            collection_name: "test".into(),
            model_name: "embedding-default-v1".into(),
            dimension,
            timeout: Duration::from_millis(500),
            disabled: false,
            test_mode: false,
            allow_empty_collection: false,
            delta_threshold: 0,
        })
    }

    fn payload(id: u64) -> PointPayload {
        PointPayload {
            content_id: id,
            source_type: "document".into(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn upsert_then_search_returns_the_point() {
        let a = adapter(3);
        a.upsert(1, vec![1.0, 0.0, 0.0], payload(1)).unwrap();
        let hits = a.search(&[1.0, 0.0, 0.0], 5, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let a = adapter(3);
        let err = a.upsert(1, vec![1.0, 0.0], payload(1)).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn available_is_false_when_disabled() {
        let a = VectorIndexAdapter::new(VectorIndexConfig {
            collection_name: "test".into(),
            model_name: "m".into(),
            dimension: 3,
            timeout: Duration::from_millis(500),
            disabled: true,
            test_mode: false,
            allow_empty_collection: false,
            delta_threshold: 0,
        });
        assert!(!a.available());
    }

    #[test]
    fn empty_collection_is_error_unless_allowed() {
        let a = adapter(3);
        assert!(matches!(a.health_status(), VectorIndexHealth::Error(_)));
    }

    #[test]
    fn reconcile_reports_missing_and_orphan() {
        let a = adapter(3);
        a.upsert(1, vec![1.0, 0.0, 0.0], payload(1)).unwrap();
        a.upsert(2, vec![0.0, 1.0, 0.0], payload(2)).unwrap();

        let report = a.reconcile(&[1, 3], true);
        assert_eq!(report.missing_in_index, vec![3]);
        assert_eq!(report.orphan_in_index, vec![2]);
        assert_eq!(report.delta, 2);
    }
}
