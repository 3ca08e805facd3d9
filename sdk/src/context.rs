//! Wires `AppConfig` into the live C1/C4/C5/C7 components, the way a
//! binary's `main()` would — this lives in the library so every `run_*`
//! facade function in `crate::operations` shares one bootstrap path.

use archivist_core::config::{AppConfig, RuntimeMode};
use embedding::{EmbeddingConfig, EmbeddingError, EmbeddingService};
use health::MetricsCollector;
use std::path::Path;
use std::time::Duration;
use storage::repo::{RepoError, Repository};
use storage::vector_index::{VectorIndexAdapter, VectorIndexConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

pub struct AppContext {
    pub config: AppConfig,
    pub mode: RuntimeMode,
    pub repo: Repository,
    pub vector_index: VectorIndexAdapter,
    pub embedder: EmbeddingService,
    pub metrics: MetricsCollector,
}

impl AppContext {
    /// Builds every component's config the way `AppConfig::load` already
    /// centralizes it, deriving `RuntimeMode` once and threading it through.
    /// Every toggle below comes off `config` itself — `AppConfig::load`
    /// (or the caller, for a hand-built config) is the only place that
    /// reads `std::env` for these; this function never does.
    pub async fn bootstrap(config: AppConfig) -> Result<Self, BootstrapError> {
        let mode = RuntimeMode::from_env();
        let busy_timeout = Duration::from_millis(config.database.busy_timeout_ms);
        let repo = Repository::open(Path::new(&config.database.path), busy_timeout)
            .await?
            .with_test_data_patterns(config.validator.test_data_patterns.clone());

        let embedder = EmbeddingService::new(
            EmbeddingConfig {
                model_name: config.embedding.model_name.clone(),
                dimension: config.embedding.dimension,
                batch_size: config.embedding.batch_size,
                device: config.embedding.device,
            },
            mode,
        )?;

        let vector_index = VectorIndexAdapter::new(VectorIndexConfig {
            collection_name: config.vector_index.collection_name.clone(),
            model_name: config.embedding.model_name.clone(),
            dimension: config.embedding.dimension,
            timeout: Duration::from_secs_f64(config.vector_index.timeout_s),
            disabled: config.vector_index.qdrant_disabled,
            test_mode: mode.is_test(),
            allow_empty_collection: config.vector_index.allow_empty_collection,
            delta_threshold: config.vector_index.delta_threshold,
        });

        Ok(Self {
            config,
            mode,
            repo,
            vector_index,
            embedder,
            metrics: MetricsCollector::new(),
        })
    }
}
