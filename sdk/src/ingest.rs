//! Orchestrates the external-ingester → validator → dedup/chunker →
//! content store → embedder → vector index data flow, including the
//! embedding/vector-index parity coordination: the embedding row is
//! written and the vector point upserted in that order, and on upsert
//! failure the embedding row is rolled back within the same logical unit.
//! Every `run_*` function in [`crate::operations`] stays a thin
//! CLI-surface wrapper; this module is where the ingestion-side
//! components actually get wired together end to end.

use archivist_core::error::{CoreError, ErrorCode};
use chunker::{ChunkerError, ChunkingConfig, DocumentChunker};
use dedup::{deduplicate_email, DedupInput};
use storage::repo::{NewContent, ProcessingFlagsUpdate, RepoError};
use storage::rows::{Content, Embedding, SourceType, ValidationStatus};
use storage::vector_index::{PointPayload, VectorIndexAdapter, VectorIndexError};
use thiserror::Error;
use validator::{ValidationRow, ValidatorError};

use crate::context::AppContext;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validator(#[from] ValidatorError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Chunker(#[from] ChunkerError),
    #[error(transparent)]
    VectorIndex(#[from] VectorIndexError),
}

impl CoreError for IngestError {
    fn error_code(&self) -> ErrorCode {
        match self {
            IngestError::Validator(e) => e.error_code(),
            IngestError::Repo(e) => e.error_code(),
            IngestError::Chunker(e) => e.error_code(),
            IngestError::VectorIndex(e) => e.error_code(),
        }
    }
}

/// Two-phase commit: encode, write the embedding row, upsert the vector
/// point, then flip `embedding_generated`. If the vector upsert fails the
/// embedding row is deleted in the same call so the state machine lands on
/// `validated, ready_for_embedding=true, embedding_generated=false` rather
/// than the two stores disagreeing. Never holds the content store's write
/// lock across the vector index call.
pub async fn embed_and_index(
    ctx: &AppContext,
    content_id: u64,
) -> Result<(), IngestError> {
    let content = ctx
        .repo
        .get_content(content_id)
        .await
        .ok_or(RepoError::ContentNotFound(content_id))?;

    let text = content
        .substantive_text
        .as_deref()
        .unwrap_or(content.body.as_str());
    let vector = ctx.embedder.encode(text);

    ctx.repo
        .put_embedding(Embedding {
            content_id,
            model_name: ctx.embedder.model_name().to_string(),
            dimension: ctx.embedder.dimension(),
            vector: vector.clone(),
        })
        .await?;

    let payload = PointPayload {
        content_id,
        source_type: content.source_type.as_str().to_string(),
        created_at: content.created_at,
    };
    if let Err(e) = ctx.vector_index.upsert(content_id, vector, payload) {
        // Compensating delete: the content store must not carry an
        // embedding row the vector index never received.
        ctx.repo.delete_embedding(content_id).await?;
        return Err(e.into());
    }

    ctx.repo
        .update_processing_flags(
            content_id,
            ProcessingFlagsUpdate {
                embedding_generated: Some(true),
                ..Default::default()
            },
        )
        .await?;
    Ok(())
}

/// Validates one email thread through the validator, runs the
/// deduplication algorithm, upserts the unique `IndividualMessage`/
/// `MessageOccurrence` rows, and emits one `email_message` Content row per
/// unique `message_hash` (never per occurrence). Embedding generation for
/// `email_message` rows is left to the caller: `email_summary` defaults to
/// "never embed", and emails in general are excluded from the
/// embeddable-chunk surface, so this function does not call
/// [`embed_and_index`] itself.
pub async fn ingest_email_thread(
    ctx: &AppContext,
    input: DedupInput,
) -> Result<Vec<u64>, IngestError> {
    let email_id = input.email_id.clone();
    let subject = input.subject.clone();
    let output = deduplicate_email(&input);

    for message in &output.messages {
        ctx.repo.upsert_message(message.clone()).await?;
    }
    for occurrence in output.occurrences {
        ctx.repo.add_occurrence(occurrence).await?;
    }

    let mut content_ids = Vec::with_capacity(output.messages.len());
    for message in &output.messages {
        let row = ValidationRow {
            source_type: SourceType::EmailMessage,
            source_id: message.message_hash.clone(),
            title: subject.clone(),
            body: message.content.clone(),
            email_identifier: Some(email_id.clone()),
            date_sent: Some(message.date_sent),
            metadata: serde_json::json!({ "message_hash": message.message_hash }),
        };
        match validator::ingest_validated(&ctx.config.validator, &ctx.repo, row).await {
            Ok(id) => content_ids.push(id),
            Err(ValidatorError::DuplicateContent(_)) => {
                // Same message observed in a second thread/email: the
                // occurrence audit above already recorded this appearance,
                // no second Content row is needed.
            }
            Err(other) => return Err(other.into()),
        }
    }
    Ok(content_ids)
}

/// Validates one document through the validator, persists the parent
/// `Content` row, then runs the chunker/scorer to emit `document_chunk`
/// children. Chunks whose quality score clears `min_quality` are flagged
/// `ready_for_embedding` and immediately pushed through
/// [`embed_and_index`]; the parent document itself is never embedded
/// directly (only its chunks are retrieval-eligible).
pub struct DocumentIngestOutcome {
    pub parent_id: u64,
    pub chunk_ids: Vec<u64>,
}

pub async fn ingest_document(
    ctx: &AppContext,
    row: ValidationRow,
    chunking: &ChunkingConfig,
) -> Result<DocumentIngestOutcome, IngestError> {
    if row.source_type != SourceType::Document {
        return Err(ChunkerError::NotADocument(row.source_type).into());
    }

    let parent_id = validator::ingest_validated(&ctx.config.validator, &ctx.repo, row).await?;
    let parent: Content = ctx
        .repo
        .get_content(parent_id)
        .await
        .ok_or(RepoError::ContentNotFound(parent_id))?;

    let chunker = DocumentChunker::new(chunking.clone());
    let chunks = chunker.chunk_document(&parent)?;

    let mut chunk_ids = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let new_content = NewContent {
            source_type: SourceType::DocumentChunk,
            source_id: chunk.chunk_id.clone(),
            title: parent.title.clone(),
            body: chunk.text,
            metadata: serde_json::json!({
                "parent_sha256": chunk.parent_sha256,
                "chunk_index": chunk.chunk_index,
            }),
        };
        let chunk_id = ctx
            .repo
            .add_content(new_content, storage::repo::DuplicateMode::Merge)
            .await?;
        ctx.repo
            .update_processing_flags(
                chunk_id,
                ProcessingFlagsUpdate {
                    validation_status: Some(ValidationStatus::Validated),
                    quality_score: Some(chunk.quality_score),
                    ready_for_embedding: Some(chunk.ready_for_embedding),
                    ..Default::default()
                },
            )
            .await?;
        if chunk.ready_for_embedding {
            embed_and_index(ctx, chunk_id).await?;
        }
        chunk_ids.push(chunk_id);
    }

    Ok(DocumentIngestOutcome {
        parent_id,
        chunk_ids,
    })
}
