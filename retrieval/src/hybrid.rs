//! Hybrid retrieval: Reciprocal Rank Fusion over the independent
//! semantic (`crate::semantic`) and literal (`crate::literal`) result sets.
//!
//! `score(i) = w_s / (k + r_s(i)) + w_k / (k + r_k(i))`, with a missing rank
//! on either side treated as `+infinity` so that term vanishes.

use crate::literal::{self, LiteralSearchError};
use crate::semantic::{self, SemanticSearchError};
use crate::validation::{LiteralField, SearchFilters, ValidationError};
use archivist_core::config::RetrievalConfig;
use archivist_core::error::{CoreError, ErrorCode};
use chrono::{DateTime, Utc};
use embedding::EmbeddingService;
use std::collections::HashMap;
use storage::repo::Repository;
use storage::rows::SourceType;
use storage::vector_index::VectorIndexAdapter;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HybridSearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("vector index is unavailable")]
    VectorStoreUnavailable,
}

impl CoreError for HybridSearchError {
    fn error_code(&self) -> ErrorCode {
        match self {
            HybridSearchError::Validation(e) => e.error_code(),
            HybridSearchError::VectorStoreUnavailable => ErrorCode::Unavailable,
        }
    }
}

impl From<SemanticSearchError> for HybridSearchError {
    fn from(err: SemanticSearchError) -> Self {
        match err {
            SemanticSearchError::Validation(e) => HybridSearchError::Validation(e),
            SemanticSearchError::VectorStoreUnavailable
            | SemanticSearchError::VectorStore(_) => HybridSearchError::VectorStoreUnavailable,
        }
    }
}

impl From<LiteralSearchError> for HybridSearchError {
    fn from(err: LiteralSearchError) -> Self {
        match err {
            LiteralSearchError::Validation(e) => HybridSearchError::Validation(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HybridHit {
    pub id: u64,
    pub title: String,
    pub snippet: String,
    pub hybrid_score: f64,
    pub semantic_rank: Option<usize>,
    pub keyword_rank: Option<usize>,
    pub match_sources: Vec<&'static str>,
    /// Populated only when the caller asks `why=true`.
    pub match_reasons: Option<Vec<String>>,
    pub source_type: SourceType,
    pub created_at: DateTime<Utc>,
}

fn rrf_term(k: f64, rank: Option<usize>) -> f64 {
    match rank {
        Some(r) => 1.0 / (k + r as f64),
        None => 0.0,
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn search(
    repo: &Repository,
    vector_index: &VectorIndexAdapter,
    embedder: &EmbeddingService,
    config: &RetrievalConfig,
    query: &str,
    limit: i64,
    fields: &[LiteralField],
    filters: &SearchFilters,
    why: bool,
    include_email_sources: bool,
) -> Result<Vec<HybridHit>, HybridSearchError> {
    let semantic_results =
        semantic::search(repo, vector_index, embedder, query, limit, filters).await?;
    let literal_results = literal::search(
        config,
        repo,
        query,
        limit,
        fields,
        filters,
        include_email_sources,
    )
    .await?;

    let semantic_rank: HashMap<u64, usize> = semantic_results
        .ranked
        .iter()
        .map(|r| (r.id, r.rank))
        .collect();
    let keyword_rank: HashMap<u64, usize> = literal_results
        .ranked
        .iter()
        .map(|r| (r.id, r.rank))
        .collect();

    let mut candidate_ids: Vec<u64> = semantic_rank.keys().chain(keyword_rank.keys()).copied().collect();
    candidate_ids.sort_unstable();
    candidate_ids.dedup();

    let hybrid = &config.hybrid;
    // Normalize the weights to sum to 1 regardless of what the config
    // carries.
    let weight_sum = hybrid.w_semantic + hybrid.w_keyword;
    let (w_s, w_k) = if weight_sum > 0.0 {
        (hybrid.w_semantic / weight_sum, hybrid.w_keyword / weight_sum)
    } else {
        (0.5, 0.5)
    };

    let limit = limit.max(1) as usize;
    let limit = limit.min(crate::validation::MAX_LIMIT);

    let mut scored: Vec<(u64, f64, Option<usize>, Option<usize>)> = Vec::with_capacity(candidate_ids.len());
    for id in candidate_ids {
        let s_rank = semantic_rank.get(&id).copied();
        let k_rank = keyword_rank.get(&id).copied();
        let score = w_s * rrf_term(hybrid.k, s_rank) + w_k * rrf_term(hybrid.k, k_rank);
        scored.push((id, score, s_rank, k_rank));
    }

    let mut hydrated = Vec::with_capacity(scored.len());
    for (id, score, s_rank, k_rank) in scored {
        let Some(content) = repo.get_content(id).await else {
            continue;
        };
        hydrated.push((content, score, s_rank, k_rank));
    }

    hydrated.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.updated_at.cmp(&a.0.updated_at))
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    hydrated.truncate(limit);

    let results = hydrated
        .into_iter()
        .map(|(content, score, s_rank, k_rank)| {
            let mut match_sources = Vec::new();
            if s_rank.is_some() {
                match_sources.push("semantic");
            }
            if k_rank.is_some() {
                match_sources.push("keyword");
            }

            let match_reasons = why.then(|| {
                let mut reasons = Vec::new();
                if let Some(r) = s_rank {
                    reasons.push(format!("semantic rank {r}"));
                }
                if let Some(r) = k_rank {
                    reasons.push(format!("keyword rank {r}"));
                }
                reasons
            });

            HybridHit {
                id: content.id,
                title: content.title.clone(),
                snippet: crate::snippet::make_snippet(&content.body, query),
                hybrid_score: score,
                semantic_rank: s_rank,
                keyword_rank: k_rank,
                match_sources,
                match_reasons,
                source_type: content.source_type,
                created_at: content.created_at,
            }
        })
        .collect();

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3 docs ranked semantically `[A(1), B(2), C(3)]` and
    /// keyword `[B(1), A(2), D(3)]`, defaults `k=60, w_s=0.7, w_k=0.3`.
    /// Expected order `A > B > C > D`.
    #[test]
    fn rrf_formula_matches_the_worked_example() {
        let k = 60.0;
        let w_s = 0.7;
        let w_k = 0.3;

        let score_a = w_s * rrf_term(k, Some(1)) + w_k * rrf_term(k, Some(2));
        let score_b = w_s * rrf_term(k, Some(2)) + w_k * rrf_term(k, Some(1));
        let score_c = w_s * rrf_term(k, Some(3)) + w_k * rrf_term(k, None);
        let score_d = w_s * rrf_term(k, None) + w_k * rrf_term(k, Some(3));

        assert!((score_a - (0.7 / 61.0 + 0.3 / 62.0)).abs() < 1e-12);
        assert!((score_b - (0.7 / 62.0 + 0.3 / 61.0)).abs() < 1e-12);
        assert!(score_a > score_b);
        assert!(score_b > score_c);
        assert!(score_c > score_d);
    }

    #[test]
    fn missing_rank_contributes_zero() {
        assert_eq!(rrf_term(60.0, None), 0.0);
    }
}
