//! C2 Validator & Quarantine: refuses invalid content at the ingestion gate
//! and preserves evidence for audit and rollback.
//!
//! A pure `validate` function covering the full rule set, plus
//! `QuarantineRow`/`QuarantineBatch` persistence through `storage`'s
//! repository, and a JSON report shape for the CI-facing surface.

use archivist_core::config::ValidatorConfig;
use archivist_core::error::{CoreError, ErrorCode};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use storage::repo::{
    NewContent, Repository, RepoError, RestorableContent,
};
use storage::rows::{SourceType, ValidationStatus, ViolationCategory};
use storage::vector_index::VectorIndexAdapter;
use thiserror::Error;

/// External message identifier shape for email-sourced rows.
static EMAIL_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^1[0-9a-f]{15}$").expect("valid regex"));

/// One row awaiting validation, in the shape the ingester hands to C2 before
/// it ever becomes a `storage::rows::Content` row.
#[derive(Debug, Clone)]
pub struct ValidationRow {
    pub source_type: SourceType,
    pub source_id: String,
    pub title: String,
    pub body: String,
    /// Required for email-sourced rows; `None` for documents.
    pub email_identifier: Option<String>,
    /// Required for email-sourced rows; `None` for documents.
    pub date_sent: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl ValidationRow {
    fn is_email(&self) -> bool {
        matches!(
            self.source_type,
            SourceType::EmailMessage | SourceType::EmailSummary
        )
    }
}

/// A single failing rule. Every rule must pass, so `validate`
/// stops and reports the first violation it finds, checked in a fixed
/// priority order.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationViolation {
    #[error("email identifier does not match ^1[0-9a-f]{{15}}$")]
    BadId,
    #[error("subject/title is empty after trim")]
    NoSubject,
    #[error("body is all whitespace")]
    WhitespaceBody,
    #[error("body has fewer than {min} non-whitespace characters")]
    TinyBody { min: usize },
    #[error("date {date} is out of range [{min_year}-01-01, now]")]
    OutOfRangeDate { date: DateTime<Utc>, min_year: i32 },
    #[error("test data pattern '{pattern}' matched title '{title}' (source_type={source_type})")]
    TestDataBlocked {
        pattern: String,
        title: String,
        source_type: String,
    },
}

impl ValidationViolation {
    pub fn category(&self) -> ViolationCategory {
        match self {
            ValidationViolation::BadId => ViolationCategory::BadId,
            ValidationViolation::NoSubject => ViolationCategory::NoSubject,
            ValidationViolation::WhitespaceBody => ViolationCategory::WhitespaceBody,
            ValidationViolation::TinyBody { .. } => ViolationCategory::TinyBody,
            ValidationViolation::OutOfRangeDate { .. } => ViolationCategory::OutOfRangeDate,
            ValidationViolation::TestDataBlocked { .. } => ViolationCategory::TestDataBlocked,
        }
    }
}

impl CoreError for ValidationViolation {
    fn error_code(&self) -> ErrorCode {
        match self {
            ValidationViolation::TestDataBlocked { .. } => ErrorCode::FailedPrecondition,
            _ => ErrorCode::InvalidArgument,
        }
    }
}

/// Top-level validator error: either a local rule violation, or a
/// duplicate surfaced back from the content store once `add_content`
/// actually runs.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error(transparent)]
    Violation(#[from] ValidationViolation),
    #[error("content with sha256 {0} already exists")]
    DuplicateContent(String),
    #[error("repository error: {0}")]
    Repo(#[from] RepoError),
}

impl CoreError for ValidatorError {
    fn error_code(&self) -> ErrorCode {
        match self {
            ValidatorError::Violation(v) => v.error_code(),
            ValidatorError::DuplicateContent(_) => ErrorCode::AlreadyExists,
            ValidatorError::Repo(e) => e.error_code(),
        }
    }
}

/// Pure rule check. Does not touch the hash-uniqueness rule, which is
/// delegated to the content store at the call site (`ingest_validated`).
pub fn validate(config: &ValidatorConfig, row: &ValidationRow) -> Result<(), ValidationViolation> {
    if row.is_email() {
        let id = row.email_identifier.as_deref().unwrap_or("");
        if !EMAIL_ID_PATTERN.is_match(id) {
            return Err(ValidationViolation::BadId);
        }
    }

    if row.title.trim().is_empty() {
        return Err(ValidationViolation::NoSubject);
    }

    let non_whitespace = row.body.chars().filter(|c| !c.is_whitespace()).count();
    if non_whitespace == 0 {
        return Err(ValidationViolation::WhitespaceBody);
    }
    if non_whitespace < config.min_body_chars {
        return Err(ValidationViolation::TinyBody {
            min: config.min_body_chars,
        });
    }

    if let Some(date_sent) = row.date_sent {
        let min_date = chrono::NaiveDate::from_ymd_opt(config.min_year, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| DateTime::<Utc>::from_naive_utc_and_offset(d, Utc))
            .expect("min_year produces a valid date");
        if date_sent < min_date || date_sent > Utc::now() {
            return Err(ValidationViolation::OutOfRangeDate {
                date: date_sent,
                min_year: config.min_year,
            });
        }
    }

    if let Some(pattern) = archivist_core::test_data::first_match(
        &config.test_data_patterns,
        &row.title,
        &row.body,
    ) {
        return Err(ValidationViolation::TestDataBlocked {
            pattern: pattern.to_string(),
            title: row.title.clone(),
            source_type: row.source_type.as_str().to_string(),
        });
    }

    Ok(())
}

/// Runs `validate`, then on success attempts `add_content` in strict mode so
/// the hash-uniqueness rule surfaces as
/// [`ValidatorError::DuplicateContent`] rather than a silent merge.
pub async fn ingest_validated(
    config: &ValidatorConfig,
    repo: &Repository,
    row: ValidationRow,
) -> Result<u64, ValidatorError> {
    validate(config, &row)?;

    let new = NewContent {
        source_type: row.source_type,
        source_id: row.source_id,
        title: row.title,
        body: row.body,
        metadata: row.metadata,
    };
    match repo
        .add_content(new, storage::repo::DuplicateMode::Strict)
        .await
    {
        Ok(id) => {
            repo.update_processing_flags(
                id,
                storage::repo::ProcessingFlagsUpdate {
                    validation_status: Some(ValidationStatus::Validated),
                    ..Default::default()
                },
            )
            .await?;
            Ok(id)
        }
        Err(RepoError::DuplicateContent(sha256)) => Err(ValidatorError::DuplicateContent(sha256)),
        Err(other) => Err(ValidatorError::Repo(other)),
    }
}

fn restorable_snapshot(row: &ValidationRow) -> serde_json::Value {
    let sha256 = archivist_core::ids::sha256_hex(row.body.as_bytes());
    serde_json::to_value(RestorableContent {
        source_type: row.source_type,
        source_id: row.source_id.clone(),
        title: row.title.clone(),
        body: row.body.clone(),
        sha256,
        metadata: row.metadata.clone(),
    })
    .unwrap_or(serde_json::Value::Null)
}

/// Atomically isolates a set of invalid rows under
/// one `batch_id`. Preserves the evidence snapshot so [`rollback`] can
/// reconstruct the original `Content` row.
pub async fn quarantine_batch(
    repo: &Repository,
    rows: Vec<(ValidationRow, ViolationCategory)>,
    description: String,
) -> Result<String, RepoError> {
    let snapshot_rows = rows
        .into_iter()
        .map(|(row, category)| (restorable_snapshot(&row), category))
        .collect();
    repo.quarantine_batch(snapshot_rows, description).await
}

#[derive(Debug, Clone, Default)]
pub struct RollbackOutcome {
    pub restored_count: usize,
    /// Present when a vector index was supplied: the dry-run parity delta
    /// after restoration, so callers know which ids need re-embedding.
    pub parity_delta: Option<storage::vector_index::ReconcileReport>,
}

/// Restores rows into Content and marks the batch
/// rolled back. When `vector_index` is supplied, also runs a dry-run
/// reconcile so restored rows missing an embedding surface immediately —
/// triggers a vector parity check to re-enqueue embeddings.
pub async fn rollback(
    repo: &Repository,
    vector_index: Option<&VectorIndexAdapter>,
    batch_id: &str,
) -> Result<RollbackOutcome, RepoError> {
    let restored_count = repo.rollback_batch(batch_id).await?;
    let parity_delta = if let Some(index) = vector_index {
        let expected = repo.ids_flagged_ready_or_embedded().await;
        Some(index.reconcile(&expected, true))
    } else {
        None
    };
    Ok(RollbackOutcome {
        restored_count,
        parity_delta,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CiGateReport {
    pub exit_code: u8,
    pub scanned: usize,
    pub failing: Vec<(usize, ViolationCategory)>,
}

/// Exit 0 iff every row passes current rules, else 1.
pub fn ci_gate(config: &ValidatorConfig, rows: &[ValidationRow]) -> CiGateReport {
    let mut failing = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        if let Err(violation) = validate(config, row) {
            failing.push((index, violation.category()));
        }
    }
    CiGateReport {
        exit_code: if failing.is_empty() { 0 } else { 1 },
        scanned: rows.len(),
        failing,
    }
}

/// JSON report schema: `{ts, regex, dataset_scan, actions, ci_gates, notes}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ts: DateTime<Utc>,
    pub regex: Vec<String>,
    pub dataset_scan: DatasetScanSummary,
    pub actions: ActionsSummary,
    pub ci_gates: CiGateSummary,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetScanSummary {
    pub scanned: usize,
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionsSummary {
    pub quarantined_rows: usize,
    pub rolled_back_rows: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CiGateSummary {
    pub exit_code: u8,
    pub failing_rows: usize,
}

impl ValidationReport {
    pub fn from_scan(config: &ValidatorConfig, rows: &[ValidationRow]) -> Self {
        let gate = ci_gate(config, rows);
        let failed = gate.failing.len();
        ValidationReport {
            ts: Utc::now(),
            regex: config.test_data_patterns.clone(),
            dataset_scan: DatasetScanSummary {
                scanned: rows.len(),
                passed: rows.len() - failed,
                failed,
            },
            actions: ActionsSummary {
                quarantined_rows: failed,
                rolled_back_rows: 0,
            },
            ci_gates: CiGateSummary {
                exit_code: gate.exit_code,
                failing_rows: failed,
            },
            notes: Vec::new(),
        }
    }
}
