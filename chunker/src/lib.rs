//! C8 Chunker & Quality Scorer: splits documents into embedding-sized chunks
//! and scores each for embedding eligibility.
//!
//! Built around `text-splitter`'s `SemanticChunker`, driven by a single
//! consistent `ChunkingConfig`, with a [`QualityScorer`] trait so the
//! chunker depends on the scorer, never the reverse.

use archivist_core::error::{CoreError, ErrorCode};
use storage::rows::{Content, SourceType};
use text_splitter::TextSplitter;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("chunker only accepts source_type=document, got {0:?}")]
    NotADocument(SourceType),
}

impl CoreError for ChunkerError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::InvalidArgument
    }
}

/// Deterministic features only (length, alpha ratio, punctuation density,
/// OCR-artifact ratio) — no model call, so chunking stays synchronous.
pub trait QualityScorer: Send + Sync {
    fn score(&self, text: &str) -> f32;
}

pub struct HeuristicQualityScorer;

impl QualityScorer for HeuristicQualityScorer {
    fn score(&self, text: &str) -> f32 {
        let total = text.chars().count().max(1) as f32;
        let alpha = text.chars().filter(|c| c.is_alphabetic()).count() as f32;
        let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count() as f32;
        let ocr_artifacts = count_ocr_artifacts(text) as f32;

        let alpha_ratio = alpha / total;
        let punctuation_density = punctuation / total;
        let ocr_artifact_ratio = ocr_artifacts / total;

        let length_score = (total / 200.0).min(1.0);
        let punctuation_penalty = (1.0 - punctuation_density * 4.0).clamp(0.0, 1.0);
        let ocr_penalty = (1.0 - ocr_artifact_ratio * 10.0).clamp(0.0, 1.0);

        let score = 0.35 * length_score + 0.35 * alpha_ratio + 0.15 * punctuation_penalty
            + 0.15 * ocr_penalty;
        score.clamp(0.0, 1.0)
    }
}

fn count_ocr_artifacts(text: &str) -> usize {
    text.matches('\u{FFFD}').count() + text.matches("||").count() + text.matches("___").count()
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size. Approximated in characters since no tokenizer is
    /// in scope here; callers that need model-exact token counts should
    /// convert their budget to characters before constructing this config.
    pub target_chars: usize,
    pub min_quality: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chars: 1000,
            min_quality: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub chunk_index: usize,
    pub parent_sha256: String,
    pub text: String,
    pub quality_score: f32,
    pub ready_for_embedding: bool,
}

pub struct DocumentChunker<S: QualityScorer = HeuristicQualityScorer> {
    config: ChunkingConfig,
    scorer: S,
    splitter: TextSplitter<text_splitter::Characters>,
}

impl DocumentChunker<HeuristicQualityScorer> {
    pub fn new(config: ChunkingConfig) -> Self {
        Self::with_scorer(config, HeuristicQualityScorer)
    }
}

impl<S: QualityScorer> DocumentChunker<S> {
    pub fn with_scorer(config: ChunkingConfig, scorer: S) -> Self {
        Self {
            config,
            scorer,
            splitter: TextSplitter::default().with_trim_chunks(true),
        }
    }

    /// Rejects anything whose `source_type != document` — this must not be
    /// callable for emails.
    pub fn chunk_document(&self, parent: &Content) -> Result<Vec<DocumentChunk>, ChunkerError> {
        if parent.source_type != SourceType::Document {
            return Err(ChunkerError::NotADocument(parent.source_type));
        }

        let text = parent
            .substantive_text
            .as_deref()
            .unwrap_or(parent.body.as_str());

        let chunks = self
            .splitter
            .chunks(text, self.config.target_chars)
            .enumerate()
            .map(|(index, slice)| {
                let quality_score = self.scorer.score(slice);
                DocumentChunk {
                    chunk_id: format!("{}_{}", parent.sha256, index),
                    chunk_index: index,
                    parent_sha256: parent.sha256.clone(),
                    text: slice.to_string(),
                    quality_score,
                    ready_for_embedding: quality_score >= self.config.min_quality,
                }
            })
            .collect();

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storage::rows::ValidationStatus;

    fn document(body: &str) -> Content {
        Content {
            id: 1,
            source_type: SourceType::Document,
            source_id: "doc-1".to_string(),
            title: "Brief".to_string(),
            body: body.to_string(),
            substantive_text: None,
            sha256: "abc123".to_string(),
            quality_score: 0.0,
            embedding_generated: false,
            validation_status: ValidationStatus::Validated,
            ready_for_embedding: false,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_non_document_source_types() {
        let chunker = DocumentChunker::new(ChunkingConfig::default());
        let mut email = document("hello");
        email.source_type = SourceType::EmailMessage;
        let err = chunker.chunk_document(&email).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn chunk_ids_are_derived_from_parent_sha256_and_index() {
        let chunker = DocumentChunker::new(ChunkingConfig {
            target_chars: 20,
            min_quality: 0.0,
        });
        let long_text = "Alpha beta gamma delta epsilon zeta eta theta iota kappa. ".repeat(5);
        let chunks = chunker.chunk_document(&document(&long_text)).unwrap();
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, format!("abc123_{}", i));
            assert_eq!(chunk.parent_sha256, "abc123");
        }
    }

    #[test]
    fn low_quality_chunks_are_not_ready_for_embedding() {
        let chunker = DocumentChunker::new(ChunkingConfig {
            target_chars: 1000,
            min_quality: 0.9,
        });
        let chunks = chunker.chunk_document(&document("a1!@#")).unwrap();
        assert!(!chunks[0].ready_for_embedding);
    }

    #[test]
    fn quality_scorer_is_deterministic() {
        let scorer = HeuristicQualityScorer;
        let a = scorer.score("The quick brown fox jumps over the lazy dog.");
        let b = scorer.score("The quick brown fox jumps over the lazy dog.");
        assert_eq!(a, b);
        assert!((0.0..=1.0).contains(&a));
    }
}
