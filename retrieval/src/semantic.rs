//! Semantic search: validate -> probe vector index availability -> encode ->
//! vector search -> hydrate from the content store. Fails fast (no keyword
//! fallback) when the vector index is unavailable.

use crate::validation::{validate_limit, validate_query_text, SearchFilters, ValidationError};
use archivist_core::error::{CoreError, ErrorCode};
use chrono::{DateTime, Utc};
use embedding::EmbeddingService;
use storage::repo::Repository;
use storage::rows::SourceType;
use storage::vector_index::{VectorIndexAdapter, VectorIndexError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SemanticSearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("vector index is unavailable")]
    VectorStoreUnavailable,
    #[error("vector index error: {0}")]
    VectorStore(#[from] VectorIndexError),
}

impl CoreError for SemanticSearchError {
    fn error_code(&self) -> ErrorCode {
        match self {
            SemanticSearchError::Validation(e) => e.error_code(),
            SemanticSearchError::VectorStoreUnavailable | SemanticSearchError::VectorStore(_) => {
                ErrorCode::Unavailable
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    pub id: u64,
    pub title: String,
    pub snippet: String,
    pub score: f32,
    pub source_type: SourceType,
    pub created_at: DateTime<Utc>,
}

/// One ranked id with its semantic score, kept around for the hybrid merge
/// (`crate::hybrid`) so it does not need to re-run the vector search.
#[derive(Debug, Clone)]
pub struct RankedSemanticId {
    pub id: u64,
    pub rank: usize,
    pub score: f32,
}

pub struct SemanticRankedResults {
    pub ranked: Vec<RankedSemanticId>,
    pub hits: Vec<SemanticHit>,
}

pub async fn search(
    repo: &Repository,
    vector_index: &VectorIndexAdapter,
    embedder: &EmbeddingService,
    query: &str,
    limit: i64,
    filters: &SearchFilters,
) -> Result<SemanticRankedResults, SemanticSearchError> {
    let query = validate_query_text(query)?;
    let limit = validate_limit(limit)?;
    filters.validate()?;

    if !vector_index.available() {
        return Err(SemanticSearchError::VectorStoreUnavailable);
    }

    let vector = embedder.encode(&query);
    let source_type_filter = filters
        .source_type
        .as_ref()
        .map(|types| types.iter().map(|t| t.as_str().to_string()).collect::<Vec<_>>());

    let raw_hits = vector_index.search(
        &vector,
        limit * 2,
        source_type_filter.as_deref(),
    )?;

    let mut ranked = Vec::with_capacity(raw_hits.len());
    let mut hits = Vec::with_capacity(limit);
    for (rank, hit) in raw_hits.iter().enumerate() {
        ranked.push(RankedSemanticId {
            id: hit.id,
            rank: rank + 1,
            score: hit.score,
        });

        if hits.len() >= limit {
            continue;
        }
        let Some(content) = repo.get_content(hit.id).await else {
            continue;
        };
        if let Some(from) = filters.date_from {
            if content.created_at < from {
                continue;
            }
        }
        if let Some(to) = filters.date_to {
            if content.created_at > to {
                continue;
            }
        }
        hits.push(SemanticHit {
            id: content.id,
            title: content.title.clone(),
            snippet: crate::snippet::make_snippet(&content.body, &query),
            score: hit.score,
            source_type: content.source_type,
            created_at: content.created_at,
        });
    }

    Ok(SemanticRankedResults { ranked, hits })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use storage::repo::{DuplicateMode, NewContent};
    use storage::vector_index::{PointPayload, VectorIndexConfig};
    use tempfile::tempdir;

    async fn fixture() -> (Repository, VectorIndexAdapter, EmbeddingService, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = Repository::open(dir.path().join("c.wal"), Duration::from_secs(5))
            .await
            .unwrap();
        let index = VectorIndexAdapter::new(VectorIndexConfig {
            collection_name: "test".into(),
            model_name: "embedding-default-v1".into(),
            dimension: 8,
            timeout: Duration::from_millis(500),
            disabled: false,
            test_mode: true,
            allow_empty_collection: true,
            delta_threshold: 0,
        });
        let embedder = EmbeddingService::new(
            embedding::EmbeddingConfig {
                model_name: "embedding-default-v1".into(),
                dimension: 8,
                batch_size: 4,
                device: archivist_core::config::Device::Auto,
            },
            archivist_core::config::RuntimeMode::Test,
        )
        .unwrap();
        (repo, index, embedder, dir)
    }

    #[tokio::test]
    async fn fails_fast_when_vector_index_unavailable() {
        let (repo, mut _index, embedder, _dir) = fixture().await;
        let disabled = VectorIndexAdapter::new(VectorIndexConfig {
            collection_name: "test".into(),
            model_name: "m".into(),
            dimension: 8,
            timeout: Duration::from_millis(500),
            disabled: true,
            test_mode: false,
            allow_empty_collection: true,
            delta_threshold: 0,
        });
        let err = search(&repo, &disabled, &embedder, "hello", 10, &SearchFilters::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Unavailable);
    }

    #[tokio::test]
    async fn returns_hydrated_content_for_indexed_ids() {
        let (repo, index, embedder, _dir) = fixture().await;
        let id = repo
            .add_content(
                NewContent {
                    source_type: SourceType::Document,
                    source_id: "doc-1".into(),
                    title: "Settlement Brief".into(),
                    body: "the parties agree to a settlement of damages".into(),
                    metadata: serde_json::json!({}),
                },
                DuplicateMode::Merge,
            )
            .await
            .unwrap();

        let vector = embedder.encode("the parties agree to a settlement of damages");
        index
            .upsert(
                id,
                vector,
                PointPayload {
                    content_id: id,
                    source_type: "document".into(),
                    created_at: Utc::now(),
                },
            )
            .unwrap();

        let results = search(&repo, &index, &embedder, "settlement", 10, &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].id, id);
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_any_vector_call() {
        let (repo, index, embedder, _dir) = fixture().await;
        let err = search(&repo, &index, &embedder, "   ", 10, &SearchFilters::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidArgument);
    }
}
