//! C7 Health Aggregator: composes the per-component reports from C1
//! (`storage::repo::Repository`), C4 (`embedding::EmbeddingService`) and C5
//! (`storage::vector_index::VectorIndexAdapter`) into the uniform
//! `{status, details, metrics, hints}` contract and its exit-code
//! mapping, and tracks operation latency percentiles.
//!
//! The latency tracker (`MetricsCollector`, `percentile` over a bounded
//! `VecDeque` of samples) reports the search/ingest counters this system
//! actually cares about.

use archivist_core::config::RuntimeMode;
use archivist_core::health::{HealthReport, HealthStatus};
use embedding::EmbeddingService;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use storage::repo::Repository;
use storage::vector_index::{VectorIndexAdapter, VectorIndexHealth};

/// Component time budgets. A component that blows its budget is
/// downgraded to `Degraded` even if its own probe reported `Healthy`.
pub const CONTENT_STORE_BUDGET: Duration = Duration::from_millis(300);
pub const VECTOR_INDEX_BUDGET: Duration = Duration::from_millis(500);
pub const EMBEDDING_BUDGET: Duration = Duration::from_millis(50);

const MAX_LATENCY_HISTORY: usize = 1000;

struct OperationLatencies {
    samples: VecDeque<u64>,
    total: u64,
}

impl OperationLatencies {
    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(MAX_LATENCY_HISTORY),
            total: 0,
        }
    }

    fn record(&mut self, latency_us: u64) {
        if self.samples.len() == MAX_LATENCY_HISTORY {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_us);
        self.total += 1;
    }

    fn snapshot(&self) -> (u64, u64, u64, u64) {
        if self.samples.is_empty() {
            return (self.total, 0, 0, 0);
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        (
            self.total,
            percentile(&sorted, 50.0),
            percentile(&sorted, 95.0),
            percentile(&sorted, 99.0),
        )
    }
}

/// Nearest-rank percentile over an already-sorted slice.
fn percentile(sorted: &[u64], p: f32) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p / 100.0) * (sorted.len() as f32 - 1.0)).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Tracks rolling latency history for the search and ingest request paths,
/// independent of any single search/ingest call site.
pub struct MetricsCollector {
    search: Mutex<OperationLatencies>,
    ingest: Mutex<OperationLatencies>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            search: Mutex::new(OperationLatencies::new()),
            ingest: Mutex::new(OperationLatencies::new()),
        }
    }

    pub fn record_search_latency(&self, elapsed: Duration) {
        self.search
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(elapsed.as_micros() as u64);
    }

    pub fn record_ingest_latency(&self, elapsed: Duration) {
        self.ingest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(elapsed.as_micros() as u64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (search_total, search_p50, search_p95, search_p99) = self
            .search
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot();
        let (ingest_total, ingest_p50, ingest_p95, ingest_p99) = self
            .ingest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot();
        MetricsSnapshot {
            search_total,
            search_p50_us: search_p50,
            search_p95_us: search_p95,
            search_p99_us: search_p99,
            ingest_total,
            ingest_p50_us: ingest_p50,
            ingest_p95_us: ingest_p95,
            ingest_p99_us: ingest_p99,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub search_total: u64,
    pub search_p50_us: u64,
    pub search_p95_us: u64,
    pub search_p99_us: u64,
    pub ingest_total: u64,
    pub ingest_p50_us: u64,
    pub ingest_p95_us: u64,
    pub ingest_p99_us: u64,
}

impl MetricsSnapshot {
    fn into_metric_map(self) -> HashMap<String, f64> {
        let mut m = HashMap::new();
        m.insert("search_total".to_string(), self.search_total as f64);
        m.insert("search_p50_us".to_string(), self.search_p50_us as f64);
        m.insert("search_p95_us".to_string(), self.search_p95_us as f64);
        m.insert("search_p99_us".to_string(), self.search_p99_us as f64);
        m.insert("ingest_total".to_string(), self.ingest_total as f64);
        m.insert("ingest_p50_us".to_string(), self.ingest_p50_us as f64);
        m.insert("ingest_p95_us".to_string(), self.ingest_p95_us as f64);
        m.insert("ingest_p99_us".to_string(), self.ingest_p99_us as f64);
        m
    }
}

/// Composed result of `HealthAggregator::check`.
#[derive(Debug, Clone)]
pub struct AggregateHealth {
    pub status: HealthStatus,
    pub components: HashMap<String, HealthReport>,
    pub metrics: HashMap<String, f64>,
    pub hints: Vec<String>,
}

impl AggregateHealth {
    /// Exit-code mapping; `TEST_MODE` forces a healthy exit.
    pub fn exit_code(&self, mode: RuntimeMode) -> u8 {
        self.status.exit_code(mode.is_test())
    }
}

fn budget_check(status: HealthStatus, elapsed: Duration, budget: Duration, hints: &mut Vec<String>, name: &str) -> HealthStatus {
    if elapsed > budget && status == HealthStatus::Healthy {
        hints.push(format!(
            "{name} check took {}ms, exceeding its {}ms budget",
            elapsed.as_millis(),
            budget.as_millis()
        ));
        return HealthStatus::Degraded;
    }
    status
}

fn vector_index_health_to_status(health: &VectorIndexHealth) -> (HealthStatus, Option<String>) {
    match health {
        VectorIndexHealth::Healthy { .. } => (HealthStatus::Healthy, None),
        VectorIndexHealth::Degraded(msg) => (HealthStatus::Degraded, Some(msg.clone())),
        VectorIndexHealth::Error(msg) => (HealthStatus::Error, Some(msg.clone())),
    }
}

/// Composes C1/C4/C5 health into the system-wide `/health` contract.
pub struct HealthAggregator<'a> {
    repo: &'a Repository,
    vector_index: &'a VectorIndexAdapter,
    embedder: &'a EmbeddingService,
    metrics: &'a MetricsCollector,
}

impl<'a> HealthAggregator<'a> {
    pub fn new(
        repo: &'a Repository,
        vector_index: &'a VectorIndexAdapter,
        embedder: &'a EmbeddingService,
        metrics: &'a MetricsCollector,
    ) -> Self {
        Self {
            repo,
            vector_index,
            embedder,
            metrics,
        }
    }

    pub async fn check(&self, deep: bool) -> AggregateHealth {
        let mut hints = Vec::new();
        let mut components = HashMap::new();

        let start = Instant::now();
        let mut content_report = self.repo.health_check(deep).await;
        let content_elapsed = start.elapsed();
        content_report.status = budget_check(
            content_report.status,
            content_elapsed,
            CONTENT_STORE_BUDGET,
            &mut hints,
            "content_store",
        );

        let start = Instant::now();
        let (vector_status, vector_detail) = vector_index_health_to_status(&self.vector_index.health_status());
        let vector_elapsed = start.elapsed();
        let vector_status = budget_check(vector_status, vector_elapsed, VECTOR_INDEX_BUDGET, &mut hints, "vector_index");
        let mut vector_report = HealthReport::healthy().status(vector_status);
        if let Some(detail) = &vector_detail {
            vector_report = vector_report.with_hint(detail.clone());
            hints.push(detail.clone());
        }
        if !self.vector_index.available() {
            vector_report = vector_report.status(HealthStatus::Error);
            hints.push("vector index is unavailable".to_string());
        }

        let start = Instant::now();
        let mut embedding_report = self.embedder.health_check(deep);
        let embedding_elapsed = start.elapsed();
        embedding_report.status = budget_check(
            embedding_report.status,
            embedding_elapsed,
            EMBEDDING_BUDGET,
            &mut hints,
            "embedding",
        );

        let overall = [content_report.status, vector_report.status, embedding_report.status]
            .into_iter()
            .max()
            .unwrap_or(HealthStatus::Healthy);

        hints.extend(content_report.hints.iter().cloned());
        hints.extend(embedding_report.hints.iter().cloned());

        components.insert("content_store".to_string(), content_report);
        components.insert("vector_index".to_string(), vector_report);
        components.insert("embedding".to_string(), embedding_report);

        AggregateHealth {
            status: overall,
            components,
            metrics: self.metrics.snapshot().into_metric_map(),
            hints,
        }
    }

    /// Parity check: compares the content store's `ready_for_embedding`/
    /// `embedding_generated` ids against what the vector index actually
    /// holds. A nonzero delta is reported as `Degraded` with a remediation
    /// hint rather than `Error` — even a large gap should surface as a
    /// degraded health check and a nonzero `ci-gate` exit rather than a
    /// hard health failure.
    pub async fn parity_check(&self, dry_run: bool) -> (HealthStatus, Option<String>, storage::vector_index::ReconcileReport) {
        let expected_ids = self.repo.ids_flagged_ready_or_embedded().await;
        let report = self.vector_index.reconcile(&expected_ids, dry_run);
        if report.delta == 0 {
            return (HealthStatus::Healthy, None, report);
        }
        let hint = format!(
            "{} missing, {} orphaned in the vector index; re-embed missing content and re-run reconcile",
            report.missing_in_index.len(),
            report.orphan_in_index.len()
        );
        let threshold = self.vector_index.delta_threshold() as usize;
        let status = if report.delta as usize <= threshold {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        (status, Some(hint), report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_core::config::{Device, RuntimeMode};
    use embedding::EmbeddingConfig;
    use std::time::Duration as StdDuration;
    use storage::vector_index::VectorIndexConfig;
    use tempfile::tempdir;

    async fn fixture() -> (Repository, VectorIndexAdapter, EmbeddingService, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = Repository::open(dir.path().join("c.wal"), StdDuration::from_secs(5))
            .await
            .unwrap();
        let index = VectorIndexAdapter::new(VectorIndexConfig {
            collection_name: "test".into(),
            model_name: "embedding-default-v1".into(),
            dimension: 8,
            timeout: StdDuration::from_millis(500),
            disabled: false,
            test_mode: true,
            allow_empty_collection: true,
            delta_threshold: 0,
        });
        let embedder = EmbeddingService::new(
            EmbeddingConfig {
                model_name: "embedding-default-v1".into(),
                dimension: 8,
                batch_size: 4,
                device: Device::Auto,
            },
            RuntimeMode::Test,
        )
        .unwrap();
        (repo, index, embedder, dir)
    }

    #[tokio::test]
    async fn mixed_component_statuses_compose_to_the_worst_one() {
        let (repo, index, embedder, _dir) = fixture().await;
        let metrics = MetricsCollector::new();
        let aggregator = HealthAggregator::new(&repo, &index, &embedder, &metrics);
        let result = aggregator.check(false).await;
        // content_store is Healthy, embedding reports Mock (TEST_MODE), and
        // the vector index is Degraded (empty collection, allowed empty) —
        // the worst of the three wins.
        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(result.exit_code(RuntimeMode::Test), 0);
        assert_eq!(result.exit_code(RuntimeMode::Live), 1);
    }

    #[tokio::test]
    async fn parity_check_reports_delta_as_degraded_not_error() {
        use storage::repo::{DuplicateMode, NewContent};
        use storage::rows::SourceType;

        let (repo, index, embedder, _dir) = fixture().await;
        let metrics = MetricsCollector::new();
        repo.add_content(
            NewContent {
                source_type: SourceType::Document,
                source_id: "d1".into(),
                title: "t".into(),
                body: "settlement agreement terms".into(),
                metadata: serde_json::json!({}),
            },
            DuplicateMode::Merge,
        )
        .await
        .unwrap();

        let aggregator = HealthAggregator::new(&repo, &index, &embedder, &metrics);
        let (status, hint, report) = aggregator.parity_check(true).await;
        assert_eq!(report.missing_in_index.len(), 0);
        assert_eq!(status, HealthStatus::Healthy);
        assert!(hint.is_none());
    }

    #[test]
    fn percentile_matches_nearest_rank() {
        let sorted = vec![10, 20, 30, 40, 50];
        assert_eq!(percentile(&sorted, 50.0), 30);
        assert_eq!(percentile(&sorted, 0.0), 10);
        assert_eq!(percentile(&sorted, 100.0), 50);
    }

    #[test]
    fn metrics_collector_tracks_rolling_latency_percentiles() {
        let collector = MetricsCollector::new();
        for ms in [10, 20, 30, 40, 50] {
            collector.record_search_latency(Duration::from_millis(ms));
        }
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.search_total, 5);
        assert!(snapshot.search_p50_us > 0);
    }
}
