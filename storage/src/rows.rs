use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    EmailMessage,
    EmailSummary,
    Document,
    DocumentChunk,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::EmailMessage => "email_message",
            SourceType::EmailSummary => "email_summary",
            SourceType::Document => "document",
            SourceType::DocumentChunk => "document_chunk",
        }
    }

    /// Email rows must never surface where a chunker or literal-search
    /// caller expects document-shaped content.
    pub fn is_excluded_from_embeddable_chunks(self) -> bool {
        matches!(self, SourceType::EmailMessage | SourceType::EmailSummary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Validated,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: u64,
    pub source_type: SourceType,
    pub source_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub substantive_text: Option<String>,
    pub sha256: String,
    #[serde(default)]
    pub quality_score: f32,
    #[serde(default)]
    pub embedding_generated: bool,
    pub validation_status: ValidationStatus,
    #[serde(default)]
    pub ready_for_embedding: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageContentType {
    Original,
    Reply,
    Forward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualMessage {
    pub message_hash: String,
    pub content: String,
    pub subject: String,
    pub sender_email: String,
    pub recipients: Vec<String>,
    pub date_sent: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub message_id: Option<String>,
    pub thread_id: String,
    pub content_type: MessageContentType,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Original,
    Quoted,
    Forwarded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageOccurrence {
    pub message_hash: String,
    pub email_id: String,
    pub position_in_email: usize,
    pub context_type: ContextType,
    pub quote_depth: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub content_id: u64,
    pub model_name: String,
    pub dimension: usize,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Org,
    Date,
    Court,
    Statute,
    Money,
    LegalConcept,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub content_id: u64,
    pub entity_type: EntityType,
    pub entity_value: String,
    pub confidence: f32,
    pub span_start: usize,
    pub span_end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCategory {
    BadId,
    NoSubject,
    WhitespaceBody,
    TinyBody,
    OutOfRangeDate,
    Duplicate,
    TestDataBlocked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRow {
    pub original_row_snapshot: serde_json::Value,
    pub batch_id: String,
    pub violation_category: ViolationCategory,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineBatch {
    pub batch_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub rolled_back_at: Option<chrono::DateTime<chrono::Utc>>,
    pub count: usize,
    pub description: String,
}

/// Typed envelope decoded from `Content.metadata` in hot paths (ingest,
/// reconcile), since metadata is otherwise a free-form dynamic dictionary.
/// `metadata` itself stays an opaque JSON blob at the repository boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentMetadataEnvelope {
    #[serde(default)]
    pub parent_sha256: Option<String>,
    #[serde(default)]
    pub chunk_index: Option<usize>,
    #[serde(default)]
    pub substantive_text_source: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ContentMetadataEnvelope {
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
