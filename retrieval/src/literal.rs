//! Literal search: exact/pattern lookup over `title`/`body`/
//! `substantive_text`, excluding email-sourced rows by default
//! unless the caller explicitly opts in.

use crate::validation::{
    validate_limit, validate_query_text, LiteralField, SearchFilters, ValidationError,
};
use archivist_core::config::RetrievalConfig;
use archivist_core::error::{CoreError, ErrorCode};
use chrono::{DateTime, Utc};
use storage::repo::{ContentSearchFilters, Repository, SearchField};
use storage::rows::SourceType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LiteralSearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl CoreError for LiteralSearchError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::InvalidArgument
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralHit {
    pub id: u64,
    pub title: String,
    pub snippet: String,
    pub source_type: SourceType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RankedLiteralId {
    pub id: u64,
    pub rank: usize,
}

pub struct LiteralRankedResults {
    pub ranked: Vec<RankedLiteralId>,
    pub hits: Vec<LiteralHit>,
}

fn to_search_field(field: LiteralField) -> SearchField {
    match field {
        LiteralField::Title => SearchField::Title,
        LiteralField::Body => SearchField::Body,
        LiteralField::SubstantiveText => SearchField::SubstantiveText,
    }
}

pub async fn search(
    config: &RetrievalConfig,
    repo: &Repository,
    pattern: &str,
    limit: i64,
    fields: &[LiteralField],
    filters: &SearchFilters,
    include_email_sources: bool,
) -> Result<LiteralRankedResults, LiteralSearchError> {
    let pattern = validate_query_text(pattern)?;
    let limit = validate_limit(limit)?;
    filters.validate()?;

    let exclude_source_types: Vec<SourceType> = if include_email_sources {
        Vec::new()
    } else {
        config
            .literal_default_exclude_source_types
            .iter()
            .filter_map(|s| crate::validation::parse_source_type(s).ok())
            .collect()
    };

    let search_fields = if fields.is_empty() {
        vec![SearchField::Title, SearchField::Body, SearchField::SubstantiveText]
    } else {
        fields.iter().copied().map(to_search_field).collect()
    };

    let content_filters = ContentSearchFilters {
        source_types: filters.source_type.clone(),
        exclude_source_types,
        fields: search_fields,
    };

    // Over-fetch so the hybrid merge can see up to 2x the limit.
    let rows = repo.search_content(&pattern, limit * 2, &content_filters).await;

    let mut ranked = Vec::with_capacity(rows.len());
    let mut hits = Vec::with_capacity(limit);
    for (index, content) in rows.iter().enumerate() {
        ranked.push(RankedLiteralId {
            id: content.id,
            rank: index + 1,
        });
        if hits.len() >= limit {
            continue;
        }
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
        hits.push(LiteralHit {
            id: content.id,
            title: content.title.clone(),
            snippet: crate::snippet::make_snippet(&content.body, &pattern),
            source_type: content.source_type,
            created_at: content.created_at,
        });
    }

    Ok(LiteralRankedResults { ranked, hits })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use storage::repo::{DuplicateMode, NewContent};
    use tempfile::tempdir;

    async fn repo() -> (Repository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = Repository::open(dir.path().join("c.wal"), Duration::from_secs(5))
            .await
            .unwrap();
        (repo, dir)
    }

    #[tokio::test]
    async fn excludes_email_sources_by_default() {
        let (repo, _dir) = repo().await;
        repo.add_content(
            NewContent {
                source_type: SourceType::Document,
                source_id: "d1".into(),
                title: "Brief".into(),
                body: "damages claim document".into(),
                metadata: serde_json::json!({}),
            },
            DuplicateMode::Merge,
        )
        .await
        .unwrap();
        repo.add_content(
            NewContent {
                source_type: SourceType::EmailMessage,
                source_id: "m1".into(),
                title: "Re: damages".into(),
                body: "damages claim quoted".into(),
                metadata: serde_json::json!({}),
            },
            DuplicateMode::Merge,
        )
        .await
        .unwrap();

        let config = RetrievalConfig::default();
        let results = search(&config, &repo, "damages", 10, &[], &SearchFilters::default(), false)
            .await
            .unwrap();
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].source_type, SourceType::Document);
    }

    #[tokio::test]
    async fn opt_in_includes_email_sources() {
        let (repo, _dir) = repo().await;
        repo.add_content(
            NewContent {
                source_type: SourceType::EmailMessage,
                source_id: "m1".into(),
                title: "Re: damages".into(),
                body: "damages claim quoted".into(),
                metadata: serde_json::json!({}),
            },
            DuplicateMode::Merge,
        )
        .await
        .unwrap();

        let config = RetrievalConfig::default();
        let results = search(&config, &repo, "damages", 10, &[], &SearchFilters::default(), true)
            .await
            .unwrap();
        assert_eq!(results.hits.len(), 1);
    }

    #[tokio::test]
    async fn query_length_over_1000_is_rejected() {
        let (repo, _dir) = repo().await;
        let config = RetrievalConfig::default();
        let long = "a".repeat(1001);
        let err = search(&config, &repo, &long, 10, &[], &SearchFilters::default(), false)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidArgument);
    }
}
