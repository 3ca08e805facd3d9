//! C1 Content Store: durable, journaled repository for the typed rows in
//! [`crate::rows`]. Split to avoid a single god-object into a
//! WAL-backed write path ([`crate::wal`]), an in-memory materialized view
//! rebuilt from the WAL + periodic snapshots ([`crate::snapshot`]), and the
//! typed operations below. A single writer mutates the materialized state
//! under `tx_lock`; readers take a shared lock and never block the writer
//! for longer than a map read.

use crate::rows::{
    Content, ContentMetadataEnvelope, ContextType, Embedding, Entity, IndividualMessage,
    MessageOccurrence, QuarantineBatch, QuarantineRow, SourceType, ValidationStatus,
    ViolationCategory,
};
use crate::snapshot::{SnapshotError, SnapshotManager};
use crate::wal::{Wal, WalError};
use archivist_core::error::{CoreError, ErrorCode};
use archivist_core::health::{HealthReport, HealthStatus};
use archivist_core::ids::{content_id_from_sha256, sha256_hex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("content with sha256 {0} already exists")]
    DuplicateContent(String),
    #[error("content {0} not found")]
    ContentNotFound(u64),
    #[error("test data pattern '{pattern}' matched title '{title}' (source_type={source_type})")]
    TestDataBlocked {
        pattern: String,
        title: String,
        source_type: String,
    },
    #[error("quarantine batch {0} not found")]
    BatchNotFound(String),
    #[error("quarantine batch {0} already rolled back")]
    BatchAlreadyRolledBack(String),
    #[error("timed out waiting {0:?} for the write lock")]
    WriteLockTimeout(Duration),
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError for RepoError {
    fn error_code(&self) -> ErrorCode {
        match self {
            RepoError::DuplicateContent(_) => ErrorCode::AlreadyExists,
            RepoError::TestDataBlocked { .. } => ErrorCode::FailedPrecondition,
            RepoError::ContentNotFound(_) | RepoError::BatchNotFound(_) => ErrorCode::NotFound,
            RepoError::BatchAlreadyRolledBack(_) => ErrorCode::FailedPrecondition,
            RepoError::WriteLockTimeout(_) => ErrorCode::Unavailable,
            RepoError::Wal(_) | RepoError::Snapshot(_) | RepoError::Serialization(_) => {
                ErrorCode::Internal
            }
        }
    }
}

/// Strict mode raises `DuplicateContent`; merge mode returns the existing id.
/// Selected at the call site depending on whether the caller can tolerate
/// silently folding into an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateMode {
    Strict,
    Merge,
}

pub struct NewContent {
    pub source_type: SourceType,
    pub source_id: String,
    pub title: String,
    pub body: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessingFlagsUpdate {
    pub embedding_generated: Option<bool>,
    pub quality_score: Option<f32>,
    pub substantive_text: Option<String>,
    pub validation_status: Option<ValidationStatus>,
    pub ready_for_embedding: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Title,
    Body,
    SubstantiveText,
}

#[derive(Debug, Clone)]
pub struct ContentSearchFilters {
    pub source_types: Option<Vec<SourceType>>,
    pub exclude_source_types: Vec<SourceType>,
    pub fields: Vec<SearchField>,
}

impl Default for ContentSearchFilters {
    fn default() -> Self {
        Self {
            source_types: None,
            exclude_source_types: vec![SourceType::EmailMessage, SourceType::EmailSummary],
            fields: vec![
                SearchField::Title,
                SearchField::Body,
                SearchField::SubstantiveText,
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentStats {
    pub total: usize,
    pub by_source_type: HashMap<String, usize>,
    pub embeddings_count: usize,
    pub validated_count: usize,
}

/// WAL payload: whole-row replacement, serializing the materialized row
/// rather than a delta. Rows are plain serde_json rather than an
/// rkyv-archived graph — there's no zero-copy benefit this workload
/// needs, see DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum WalEntry {
    PutContent(Content),
    DeleteContent(u64),
    PutEmbedding(Embedding),
    DeleteEmbedding(u64),
    AddEntity(Entity),
    UpsertMessage(IndividualMessage),
    AddOccurrence(MessageOccurrence),
    QuarantineBatch {
        batch: QuarantineBatch,
        rows: Vec<QuarantineRow>,
    },
    RollbackBatch {
        batch_id: String,
        rolled_back_at: chrono::DateTime<chrono::Utc>,
        restored: Vec<Content>,
    },
}

#[derive(Default)]
struct MaterializedState {
    content: HashMap<u64, Content>,
    sha256_index: HashMap<String, u64>,
    messages: HashMap<String, IndividualMessage>,
    message_id_index: HashMap<String, String>,
    occurrences: HashMap<String, Vec<MessageOccurrence>>,
    embeddings: HashMap<u64, Embedding>,
    entities: HashMap<u64, Vec<Entity>>,
    quarantine_batches: HashMap<String, QuarantineBatch>,
    quarantine_rows: HashMap<String, Vec<QuarantineRow>>,
}

impl MaterializedState {
    fn apply(&mut self, entry: &WalEntry) {
        match entry.clone() {
            WalEntry::PutContent(content) => {
                self.sha256_index
                    .insert(content.sha256.clone(), content.id);
                self.content.insert(content.id, content);
            }
            WalEntry::DeleteContent(id) => {
                if let Some(content) = self.content.remove(&id) {
                    self.sha256_index.remove(&content.sha256);
                }
                self.embeddings.remove(&id);
                self.entities.remove(&id);
            }
            WalEntry::PutEmbedding(embedding) => {
                self.embeddings.insert(embedding.content_id, embedding);
            }
            WalEntry::DeleteEmbedding(content_id) => {
                self.embeddings.remove(&content_id);
            }
            WalEntry::AddEntity(entity) => {
                self.entities.entry(entity.content_id).or_default().push(entity);
            }
            WalEntry::UpsertMessage(message) => {
                if let Some(message_id) = &message.message_id {
                    self.message_id_index
                        .insert(message_id.clone(), message.message_hash.clone());
                }
                self.messages.insert(message.message_hash.clone(), message);
            }
            WalEntry::AddOccurrence(occurrence) => {
                self.occurrences
                    .entry(occurrence.message_hash.clone())
                    .or_default()
                    .push(occurrence);
            }
            WalEntry::QuarantineBatch { batch, rows } => {
                self.quarantine_rows.insert(batch.batch_id.clone(), rows);
                self.quarantine_batches.insert(batch.batch_id.clone(), batch);
            }
            WalEntry::RollbackBatch {
                batch_id,
                rolled_back_at,
                restored,
            } => {
                if let Some(batch) = self.quarantine_batches.get_mut(&batch_id) {
                    batch.rolled_back_at = Some(rolled_back_at);
                }
                for content in restored {
                    self.sha256_index
                        .insert(content.sha256.clone(), content.id);
                    self.content.insert(content.id, content);
                }
            }
        }
    }
}

pub struct Repository {
    wal: Mutex<Wal>,
    state: RwLock<MaterializedState>,
    tx_lock: Mutex<()>,
    busy_timeout: Duration,
    snapshots: Option<SnapshotManager>,
    test_data_patterns: Vec<String>,
}

impl Repository {
    pub async fn open(wal_path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, RepoError> {
        let mut wal = Wal::open(wal_path).await?;
        let mut state = MaterializedState::default();
        wal.replay(|_, payload| {
            let entry: WalEntry =
                serde_json::from_slice(&payload).map_err(|_| WalError::CrcMismatch)?;
            state.apply(&entry);
            Ok(())
        })
        .await?;

        Ok(Self {
            wal: Mutex::new(wal),
            state: RwLock::new(state),
            tx_lock: Mutex::new(()),
            busy_timeout,
            snapshots: None,
            test_data_patterns: Vec::new(),
        })
    }

    pub fn with_snapshot_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.snapshots = Some(SnapshotManager::new(dir));
        self
    }

    /// Blocks any `add_content` whose title or body matches one of these
    /// patterns, the same gate the validator runs ahead of this store —
    /// kept here too since `add_content` is reachable directly, without
    /// going through the validator, for rows that already cleared other
    /// checks upstream (e.g. document chunks).
    pub fn with_test_data_patterns(mut self, patterns: Vec<String>) -> Self {
        self.test_data_patterns = patterns;
        self
    }

    fn check_test_data(&self, source_type: SourceType, title: &str, body: &str) -> Result<(), RepoError> {
        if let Some(pattern) =
            archivist_core::test_data::first_match(&self.test_data_patterns, title, body)
        {
            return Err(RepoError::TestDataBlocked {
                pattern: pattern.to_string(),
                title: title.to_string(),
                source_type: source_type.as_str().to_string(),
            });
        }
        Ok(())
    }

    async fn acquire_writer(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, RepoError> {
        tokio::time::timeout(self.busy_timeout, self.tx_lock.lock())
            .await
            .map_err(|_| RepoError::WriteLockTimeout(self.busy_timeout))
    }

    async fn append(&self, entry: &WalEntry) -> Result<(), RepoError> {
        let payload = serde_json::to_vec(entry)?;
        let mut wal = self.wal.lock().await;
        wal.append(&payload).await?;
        wal.flush().await?;
        Ok(())
    }

    // ---- C1: Content -----------------------------------------------------

    pub async fn add_content(
        &self,
        new: NewContent,
        mode: DuplicateMode,
    ) -> Result<u64, RepoError> {
        self.check_test_data(new.source_type, &new.title, &new.body)?;
        let _guard = self.acquire_writer().await?;

        let sha256 = sha256_hex(new.body.as_bytes());
        {
            let state = self.state.read().await;
            if let Some(existing_id) = state.sha256_index.get(&sha256).copied() {
                match mode {
                    DuplicateMode::Strict => return Err(RepoError::DuplicateContent(sha256)),
                    DuplicateMode::Merge => return Ok(existing_id),
                }
            }
        }

        let id = content_id_from_sha256(&sha256);
        let now = chrono::Utc::now();
        let content = Content {
            id,
            source_type: new.source_type,
            source_id: new.source_id,
            title: new.title,
            body: new.body,
            substantive_text: None,
            sha256,
            quality_score: 0.0,
            embedding_generated: false,
            validation_status: ValidationStatus::Pending,
            ready_for_embedding: false,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        let entry = WalEntry::PutContent(content);
        self.append(&entry).await?;
        let mut state = self.state.write().await;
        state.apply(&entry);
        Ok(id)
    }

    /// Single transaction for the whole batch, so a partial failure never
    /// leaves half the rows committed.
    pub async fn add_content_batch(
        &self,
        rows: Vec<NewContent>,
        mode: DuplicateMode,
    ) -> Result<Vec<u64>, RepoError> {
        let _guard = self.acquire_writer().await?;
        let mut ids = Vec::with_capacity(rows.len());
        let mut entries = Vec::with_capacity(rows.len());

        {
            let state = self.state.read().await;
            for new in rows {
                self.check_test_data(new.source_type, &new.title, &new.body)?;
                let sha256 = sha256_hex(new.body.as_bytes());
                if let Some(existing_id) = state.sha256_index.get(&sha256).copied() {
                    match mode {
                        DuplicateMode::Strict => {
                            return Err(RepoError::DuplicateContent(sha256))
                        }
                        DuplicateMode::Merge => {
                            ids.push(existing_id);
                            continue;
                        }
                    }
                }
                let id = content_id_from_sha256(&sha256);
                let now = chrono::Utc::now();
                let content = Content {
                    id,
                    source_type: new.source_type,
                    source_id: new.source_id,
                    title: new.title,
                    body: new.body,
                    substantive_text: None,
                    sha256,
                    quality_score: 0.0,
                    embedding_generated: false,
                    validation_status: ValidationStatus::Pending,
                    ready_for_embedding: false,
                    metadata: new.metadata,
                    created_at: now,
                    updated_at: now,
                };
                ids.push(id);
                entries.push(WalEntry::PutContent(content));
            }
        }

        let mut wal = self.wal.lock().await;
        for entry in &entries {
            let payload = serde_json::to_vec(entry)?;
            wal.append(&payload).await?;
        }
        wal.flush().await?;
        drop(wal);

        let mut state = self.state.write().await;
        for entry in &entries {
            state.apply(entry);
        }
        Ok(ids)
    }

    pub async fn get_content(&self, id: u64) -> Option<Content> {
        self.state.read().await.content.get(&id).cloned()
    }

    pub async fn search_content(
        &self,
        query: &str,
        limit: usize,
        filters: &ContentSearchFilters,
    ) -> Vec<Content> {
        let needle = query.to_lowercase();
        let state = self.state.read().await;

        let mut matches: Vec<Content> = state
            .content
            .values()
            .filter(|content| {
                if filters.exclude_source_types.contains(&content.source_type) {
                    return false;
                }
                if let Some(allowed) = &filters.source_types {
                    if !allowed.contains(&content.source_type) {
                        return false;
                    }
                }
                filters.fields.iter().any(|field| match field {
                    SearchField::Title => content.title.to_lowercase().contains(&needle),
                    SearchField::Body => content.body.to_lowercase().contains(&needle),
                    SearchField::SubstantiveText => content
                        .substantive_text
                        .as_deref()
                        .map(|t| t.to_lowercase().contains(&needle))
                        .unwrap_or(false),
                })
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        matches.truncate(limit);
        matches
    }

    /// Excludes rows that aren't embeddable chunks, guarding against a
    /// recurrence of email threads getting fed into document chunking.
    pub async fn list_ready_for_embedding(&self, limit: usize) -> Vec<Content> {
        let state = self.state.read().await;
        let mut rows: Vec<Content> = state
            .content
            .values()
            .filter(|c| {
                c.ready_for_embedding
                    && !c.embedding_generated
                    && !c.source_type.is_excluded_from_embeddable_chunks()
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows.truncate(limit);
        rows
    }

    pub async fn ids_flagged_ready_or_embedded(&self) -> Vec<u64> {
        let state = self.state.read().await;
        state
            .content
            .values()
            .filter(|c| c.ready_for_embedding || c.embedding_generated)
            .map(|c| c.id)
            .collect()
    }

    pub async fn get_content_stats(&self) -> ContentStats {
        let state = self.state.read().await;
        let mut by_source_type = HashMap::new();
        let mut validated_count = 0;
        for content in state.content.values() {
            *by_source_type
                .entry(content.source_type.as_str().to_string())
                .or_insert(0usize) += 1;
            if content.validation_status == ValidationStatus::Validated {
                validated_count += 1;
            }
        }
        ContentStats {
            total: state.content.len(),
            by_source_type,
            embeddings_count: state.embeddings.len(),
            validated_count,
        }
    }

    pub async fn update_processing_flags(
        &self,
        id: u64,
        update: ProcessingFlagsUpdate,
    ) -> Result<(), RepoError> {
        let _guard = self.acquire_writer().await?;
        let mut content = {
            let state = self.state.read().await;
            state
                .content
                .get(&id)
                .cloned()
                .ok_or(RepoError::ContentNotFound(id))?
        };

        if let Some(v) = update.embedding_generated {
            content.embedding_generated = v;
        }
        if let Some(v) = update.quality_score {
            content.quality_score = v;
        }
        if let Some(v) = update.substantive_text {
            content.substantive_text = Some(v);
        }
        if let Some(v) = update.validation_status {
            content.validation_status = v;
        }
        if let Some(v) = update.ready_for_embedding {
            content.ready_for_embedding = v;
        }
        content.updated_at = chrono::Utc::now();

        let entry = WalEntry::PutContent(content);
        self.append(&entry).await?;
        let mut state = self.state.write().await;
        state.apply(&entry);
        Ok(())
    }

    pub async fn delete_content(&self, id: u64) -> Result<(), RepoError> {
        let _guard = self.acquire_writer().await?;
        {
            let state = self.state.read().await;
            if !state.content.contains_key(&id) {
                return Err(RepoError::ContentNotFound(id));
            }
        }
        let entry = WalEntry::DeleteContent(id);
        self.append(&entry).await?;
        let mut state = self.state.write().await;
        state.apply(&entry);
        Ok(())
    }

    pub async fn health_check(&self, deep: bool) -> HealthReport {
        let stats = self.get_content_stats().await;
        let mut report = HealthReport::healthy()
            .with_metric("content_total", stats.total as f64)
            .with_metric("embeddings_count", stats.embeddings_count as f64)
            .with_metric("validated_count", stats.validated_count as f64);
        if deep {
            report = report.with_detail(
                "by_source_type",
                serde_json::to_value(&stats.by_source_type).unwrap_or_default(),
            );
        }
        report.status(HealthStatus::Healthy)
    }

    // ---- C1: Embedding -----------------------------------------------------

    pub async fn put_embedding(&self, embedding: Embedding) -> Result<(), RepoError> {
        let _guard = self.acquire_writer().await?;
        let entry = WalEntry::PutEmbedding(embedding);
        self.append(&entry).await?;
        let mut state = self.state.write().await;
        state.apply(&entry);
        Ok(())
    }

    pub async fn get_embedding(&self, content_id: u64) -> Option<Embedding> {
        self.state.read().await.embeddings.get(&content_id).cloned()
    }

    pub async fn delete_embedding(&self, content_id: u64) -> Result<(), RepoError> {
        let _guard = self.acquire_writer().await?;
        let entry = WalEntry::DeleteEmbedding(content_id);
        self.append(&entry).await?;
        let mut state = self.state.write().await;
        state.apply(&entry);
        Ok(())
    }

    // ---- C1: Entity ---------------------------------------------------------

    pub async fn add_entity(&self, entity: Entity) -> Result<(), RepoError> {
        let _guard = self.acquire_writer().await?;
        let entry = WalEntry::AddEntity(entity);
        self.append(&entry).await?;
        let mut state = self.state.write().await;
        state.apply(&entry);
        Ok(())
    }

    pub async fn entities_for_content(&self, content_id: u64) -> Vec<Entity> {
        self.state
            .read()
            .await
            .entities
            .get(&content_id)
            .cloned()
            .unwrap_or_default()
    }

    // ---- C3 support: IndividualMessage / MessageOccurrence -----------------

    pub async fn get_message(&self, message_hash: &str) -> Option<IndividualMessage> {
        self.state.read().await.messages.get(message_hash).cloned()
    }

    pub async fn get_message_by_message_id(&self, message_id: &str) -> Option<IndividualMessage> {
        let state = self.state.read().await;
        let hash = state.message_id_index.get(message_id)?;
        state.messages.get(hash).cloned()
    }

    /// Upserts an `IndividualMessage`: immutable thereafter except
    /// `updated_at` on a new occurrence. Returns `true` if a
    /// new message was created.
    pub async fn upsert_message(&self, message: IndividualMessage) -> Result<bool, RepoError> {
        let _guard = self.acquire_writer().await?;
        let is_new = {
            let state = self.state.read().await;
            !state.messages.contains_key(&message.message_hash)
        };

        let message = if is_new {
            message
        } else {
            let state = self.state.read().await;
            let mut existing = state.messages.get(&message.message_hash).cloned().unwrap();
            existing.updated_at = chrono::Utc::now();
            existing
        };

        let entry = WalEntry::UpsertMessage(message);
        self.append(&entry).await?;
        let mut state = self.state.write().await;
        state.apply(&entry);
        Ok(is_new)
    }

    pub async fn add_occurrence(&self, occurrence: MessageOccurrence) -> Result<(), RepoError> {
        let _guard = self.acquire_writer().await?;
        let entry = WalEntry::AddOccurrence(occurrence);
        self.append(&entry).await?;
        let mut state = self.state.write().await;
        state.apply(&entry);
        Ok(())
    }

    pub async fn occurrences_for_message(&self, message_hash: &str) -> Vec<MessageOccurrence> {
        self.state
            .read()
            .await
            .occurrences
            .get(message_hash)
            .cloned()
            .unwrap_or_default()
    }

    // ---- C2 support: Quarantine ---------------------------------------------

    pub async fn quarantine_batch(
        &self,
        rows: Vec<(serde_json::Value, ViolationCategory)>,
        description: String,
    ) -> Result<String, RepoError> {
        let _guard = self.acquire_writer().await?;
        let batch_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now();
        let quarantine_rows: Vec<QuarantineRow> = rows
            .into_iter()
            .map(|(snapshot, category)| QuarantineRow {
                original_row_snapshot: snapshot,
                batch_id: batch_id.clone(),
                violation_category: category,
                created_at: now,
            })
            .collect();

        let batch = QuarantineBatch {
            batch_id: batch_id.clone(),
            created_at: now,
            rolled_back_at: None,
            count: quarantine_rows.len(),
            description,
        };

        let entry = WalEntry::QuarantineBatch {
            batch,
            rows: quarantine_rows,
        };
        self.append(&entry).await?;
        let mut state = self.state.write().await;
        state.apply(&entry);
        Ok(batch_id)
    }

    pub async fn get_batch(&self, batch_id: &str) -> Option<QuarantineBatch> {
        self.state.read().await.quarantine_batches.get(batch_id).cloned()
    }

    pub async fn rows_for_batch(&self, batch_id: &str) -> Vec<QuarantineRow> {
        self.state
            .read()
            .await
            .quarantine_rows
            .get(batch_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Restores rows into Content with `validation_status=pending` and
    /// marks the batch rolled back exactly once.
    pub async fn rollback_batch(&self, batch_id: &str) -> Result<usize, RepoError> {
        let _guard = self.acquire_writer().await?;

        let rows = {
            let state = self.state.read().await;
            let batch = state
                .quarantine_batches
                .get(batch_id)
                .ok_or_else(|| RepoError::BatchNotFound(batch_id.to_string()))?;
            if batch.rolled_back_at.is_some() {
                return Err(RepoError::BatchAlreadyRolledBack(batch_id.to_string()));
            }
            state
                .quarantine_rows
                .get(batch_id)
                .cloned()
                .unwrap_or_default()
        };

        let now = chrono::Utc::now();
        let mut restored = Vec::with_capacity(rows.len());
        for row in &rows {
            let Ok(snapshot) = serde_json::from_value::<RestorableContent>(
                row.original_row_snapshot.clone(),
            ) else {
                continue;
            };
            let id = content_id_from_sha256(&snapshot.sha256);
            restored.push(Content {
                id,
                source_type: snapshot.source_type,
                source_id: snapshot.source_id,
                title: snapshot.title,
                body: snapshot.body,
                substantive_text: None,
                sha256: snapshot.sha256,
                quality_score: 0.0,
                embedding_generated: false,
                validation_status: ValidationStatus::Pending,
                ready_for_embedding: false,
                metadata: snapshot.metadata,
                created_at: now,
                updated_at: now,
            });
        }

        let restored_count = restored.len();
        let entry = WalEntry::RollbackBatch {
            batch_id: batch_id.to_string(),
            rolled_back_at: now,
            restored,
        };
        self.append(&entry).await?;
        let mut state = self.state.write().await;
        state.apply(&entry);
        Ok(restored_count)
    }

    /// Post-batch maintenance pass: snapshot the materialized state so
    /// WAL replay on restart has a recent checkpoint to start from.
    pub async fn checkpoint(&self) -> Result<(), RepoError> {
        let Some(snapshots) = &self.snapshots else {
            return Ok(());
        };
        let state = self.state.read().await;
        let payload = serde_json::to_vec(&CheckpointSnapshot {
            content: state.content.values().cloned().collect(),
            messages: state.messages.values().cloned().collect(),
        })?;
        let lsn = self.wal.lock().await.current_lsn();
        snapshots.create_snapshot(lsn, &payload).await?;
        Ok(())
    }

    pub fn snapshot_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// Shape serialized into `QuarantineRow.original_row_snapshot` by the
/// validator crate so a later rollback can reconstruct the Content row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestorableContent {
    pub source_type: SourceType,
    pub source_id: String,
    pub title: String,
    pub body: String,
    pub sha256: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointSnapshot {
    content: Vec<Content>,
    messages: Vec<IndividualMessage>,
}

/// Decodes `Content.metadata` into the typed envelope for hot-path callers
/// (ingest, reconcile).
pub fn metadata_envelope(content: &Content) -> ContentMetadataEnvelope {
    ContentMetadataEnvelope::from_value(&content.metadata)
}

pub fn occurrence_context(is_first_seen: bool) -> ContextType {
    if is_first_seen {
        ContextType::Original
    } else {
        ContextType::Quoted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn repo() -> (Repository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = Repository::open(dir.path().join("content.wal"), Duration::from_secs(5))
            .await
            .unwrap();
        (repo, dir)
    }

    fn new_content(body: &str) -> NewContent {
        NewContent {
            source_type: SourceType::Document,
            source_id: "doc-1".to_string(),
            title: "Title".to_string(),
            body: body.to_string(),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn add_content_is_idempotent_under_strict_mode() {
        let (repo, _dir) = repo().await;
        repo.add_content(new_content("hello world"), DuplicateMode::Strict)
            .await
            .unwrap();
        let err = repo
            .add_content(new_content("hello world"), DuplicateMode::Strict)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::AlreadyExists);
    }

    #[tokio::test]
    async fn add_content_is_idempotent_under_merge_mode() {
        let (repo, _dir) = repo().await;
        let id1 = repo
            .add_content(new_content("hello world"), DuplicateMode::Merge)
            .await
            .unwrap();
        let id2 = repo
            .add_content(new_content("hello world"), DuplicateMode::Merge)
            .await
            .unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn add_content_blocks_test_data_patterns() {
        let dir = tempdir().unwrap();
        let repo = Repository::open(dir.path().join("content.wal"), Duration::from_secs(5))
            .await
            .unwrap()
            .with_test_data_patterns(vec!["TEST FIXTURE".to_string()]);

        let mut row = new_content("lorem");
        row.title = "TEST FIXTURE".to_string();
        let err = repo
            .add_content(row, DuplicateMode::Strict)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::FailedPrecondition);
        assert!(matches!(err, RepoError::TestDataBlocked { .. }));
        assert_eq!(repo.get_content_stats().await.total, 0);
    }

    #[tokio::test]
    async fn sha256_is_unique_across_the_table() {
        let (repo, _dir) = repo().await;
        let id = repo
            .add_content(new_content("unique text"), DuplicateMode::Merge)
            .await
            .unwrap();
        let content = repo.get_content(id).await.unwrap();
        let stats = repo.get_content_stats().await;
        assert_eq!(stats.total, 1);
        assert_eq!(content.validation_status, ValidationStatus::Pending);
    }

    #[tokio::test]
    async fn delete_content_cascades_embeddings_and_entities() {
        let (repo, _dir) = repo().await;
        let id = repo
            .add_content(new_content("cascade me"), DuplicateMode::Merge)
            .await
            .unwrap();
        repo.put_embedding(Embedding {
            content_id: id,
            model_name: "embedding-default-v1".into(),
            dimension: 3,
            vector: vec![0.1, 0.2, 0.3],
        })
        .await
        .unwrap();
        repo.add_entity(Entity {
            content_id: id,
            entity_type: crate::rows::EntityType::Person,
            entity_value: "Jane Doe".into(),
            confidence: 0.9,
            span_start: 0,
            span_end: 8,
        })
        .await
        .unwrap();

        repo.delete_content(id).await.unwrap();
        assert!(repo.get_content(id).await.is_none());
        assert!(repo.get_embedding(id).await.is_none());
        assert!(repo.entities_for_content(id).await.is_empty());
    }

    #[tokio::test]
    async fn search_content_excludes_email_source_types_by_default() {
        let (repo, _dir) = repo().await;
        repo.add_content(new_content("legal brief about damages"), DuplicateMode::Merge)
            .await
            .unwrap();
        repo.add_content(
            NewContent {
                source_type: SourceType::EmailMessage,
                source_id: "m1".into(),
                title: "Re: damages".into(),
                body: "legal brief about damages, quoted".into(),
                metadata: serde_json::json!({}),
            },
            DuplicateMode::Merge,
        )
        .await
        .unwrap();

        let hits = repo
            .search_content("damages", 10, &ContentSearchFilters::default())
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_type, SourceType::Document);
    }

    #[tokio::test]
    async fn quarantine_and_rollback_round_trips() {
        let (repo, _dir) = repo().await;
        let snapshot = RestorableContent {
            source_type: SourceType::Document,
            source_id: "doc-2".into(),
            title: "Bad Row".into(),
            body: "short".into(),
            sha256: sha256_hex(b"short"),
            metadata: serde_json::json!({}),
        };
        let batch_id = repo
            .quarantine_batch(
                vec![(
                    serde_json::to_value(&snapshot).unwrap(),
                    ViolationCategory::TinyBody,
                )],
                "test batch".into(),
            )
            .await
            .unwrap();

        let batch = repo.get_batch(&batch_id).await.unwrap();
        assert!(batch.rolled_back_at.is_none());
        assert_eq!(batch.count, 1);

        let restored_count = repo.rollback_batch(&batch_id).await.unwrap();
        assert_eq!(restored_count, 1);

        let batch = repo.get_batch(&batch_id).await.unwrap();
        assert!(batch.rolled_back_at.is_some());

        let content = repo
            .get_content(content_id_from_sha256(&snapshot.sha256))
            .await
            .unwrap();
        assert_eq!(content.sha256, snapshot.sha256);
        assert_eq!(content.validation_status, ValidationStatus::Pending);

        let err = repo.rollback_batch(&batch_id).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::FailedPrecondition);
    }

    #[tokio::test]
    async fn wal_replay_rebuilds_state_after_reopen() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("content.wal");
        let id = {
            let repo = Repository::open(&wal_path, Duration::from_secs(5))
                .await
                .unwrap();
            repo.add_content(new_content("durable text"), DuplicateMode::Merge)
                .await
                .unwrap()
        };

        let repo = Repository::open(&wal_path, Duration::from_secs(5))
            .await
            .unwrap();
        let content = repo.get_content(id).await.unwrap();
        assert_eq!(content.body, "durable text");
    }
}
