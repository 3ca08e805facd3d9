//! Wire-level request DTOs: a flat, serde-friendly shape at the boundary
//! that converts into the strongly-typed domain value the component
//! actually wants.

use retrieval::validation::{self, SearchFilters, TagLogic, ValidationError};
use serde::{Deserialize, Serialize};
use storage::rows::SourceType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFiltersInput {
    #[serde(default)]
    pub date_from: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub date_to: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub source_type: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub tag_logic: Option<String>,
}

impl SearchFiltersInput {
    pub fn into_domain(self) -> Result<SearchFilters, ValidationError> {
        let source_type: Option<Vec<SourceType>> = match self.source_type {
            Some(raw) => Some(
                raw.iter()
                    .map(|s| validation::parse_source_type(s))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        let tag_logic = match self.tag_logic {
            Some(raw) => TagLogic::parse(&raw)?,
            None => TagLogic::default(),
        };
        Ok(SearchFilters {
            date_from: self.date_from,
            date_to: self.date_to,
            source_type,
            tags: self.tags,
            tag_logic,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SemanticSearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub filters: SearchFiltersInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiteralSearchRequest {
    pub pattern: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub filters: SearchFiltersInput,
    #[serde(default)]
    pub include_email_sources: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HybridSearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub why: bool,
    #[serde(default)]
    pub filters: SearchFiltersInput,
    #[serde(default)]
    pub include_email_sources: bool,
}

const fn default_limit() -> i64 {
    20
}
