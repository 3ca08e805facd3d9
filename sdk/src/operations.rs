//! CLI surface as a library contract: one function per CLI bullet,
//! each returning `(ExitCode, serde_json::Value)` so an external CLI can
//! wrap these without reimplementing exit-code mapping or JSON shaping.
//!
//! Every response carries `status` and `hints` so JSON outputs are
//! consistent across commands.

use crate::context::AppContext;
use crate::requests::{HybridSearchRequest, LiteralSearchRequest, SemanticSearchRequest};
use archivist_core::error::CoreError;
use health::HealthAggregator;
use serde_json::{json, Value};
use std::process::ExitCode;
use storage::rows::SourceType;
use validator::{CiGateReport, ValidationRow};

fn ok(data: Value) -> (ExitCode, Value) {
    (
        ExitCode::SUCCESS,
        json!({ "status": "ok", "hints": [], "data": data }),
    )
}

fn err(exit: u8, err: &dyn CoreError) -> (ExitCode, Value) {
    (
        ExitCode::from(exit),
        json!({ "status": "error", "hints": [err.to_string()], "error_code": err.error_code().to_string() }),
    )
}

fn source_type_label(source_type: SourceType) -> &'static str {
    source_type.as_str()
}

pub async fn run_search_semantic(ctx: &AppContext, request: SemanticSearchRequest) -> (ExitCode, Value) {
    let filters = match request.filters.into_domain() {
        Ok(f) => f,
        Err(e) => return err(e.exit_code(), &e),
    };
    match retrieval::semantic::search(
        &ctx.repo,
        &ctx.vector_index,
        &ctx.embedder,
        &request.query,
        request.limit,
        &filters,
    )
    .await
    {
        Ok(results) => ok(json!({
            "hits": results.hits.into_iter().map(|h| json!({
                "id": h.id,
                "title": h.title,
                "snippet": h.snippet,
                "score": h.score,
                "source_type": source_type_label(h.source_type),
                "created_at": h.created_at,
            })).collect::<Vec<_>>(),
        })),
        Err(e) => err(e.exit_code(), &e),
    }
}

pub async fn run_search_literal(ctx: &AppContext, request: LiteralSearchRequest) -> (ExitCode, Value) {
    let filters = match request.filters.into_domain() {
        Ok(f) => f,
        Err(e) => return err(e.exit_code(), &e),
    };
    let fields: Vec<_> = match request
        .fields
        .iter()
        .map(|f| retrieval::validation::parse_literal_field(f))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(f) => f,
        Err(e) => return err(e.exit_code(), &e),
    };
    match retrieval::literal::search(
        &ctx.config.retrieval,
        &ctx.repo,
        &request.pattern,
        request.limit,
        &fields,
        &filters,
        request.include_email_sources,
    )
    .await
    {
        Ok(results) => ok(json!({
            "hits": results.hits.into_iter().map(|h| json!({
                "id": h.id,
                "title": h.title,
                "snippet": h.snippet,
                "source_type": source_type_label(h.source_type),
                "created_at": h.created_at,
            })).collect::<Vec<_>>(),
        })),
        Err(e) => err(e.exit_code(), &e),
    }
}

pub async fn run_search_hybrid(ctx: &AppContext, request: HybridSearchRequest) -> (ExitCode, Value) {
    let filters = match request.filters.into_domain() {
        Ok(f) => f,
        Err(e) => return err(e.exit_code(), &e),
    };
    match retrieval::hybrid::search(
        &ctx.repo,
        &ctx.vector_index,
        &ctx.embedder,
        &ctx.config.retrieval,
        &request.query,
        request.limit,
        &[],
        &filters,
        request.why,
        request.include_email_sources,
    )
    .await
    {
        Ok(hits) => ok(json!({
            "hits": hits.into_iter().map(|h| json!({
                "id": h.id,
                "title": h.title,
                "snippet": h.snippet,
                "hybrid_score": h.hybrid_score,
                "semantic_rank": h.semantic_rank,
                "keyword_rank": h.keyword_rank,
                "match_sources": h.match_sources,
                "match_reasons": h.match_reasons,
                "source_type": source_type_label(h.source_type),
                "created_at": h.created_at,
            })).collect::<Vec<_>>(),
        })),
        Err(e) => err(e.exit_code(), &e),
    }
}

/// Exit mapping is owned by `HealthStatus::exit_code`, not the
/// generic `CoreError::exit_code` default (health has its own 0/1/2 rule,
/// including the `TEST_MODE` force-healthy case).
pub async fn run_admin_health(ctx: &AppContext, deep: bool) -> (ExitCode, Value) {
    let aggregator = HealthAggregator::new(&ctx.repo, &ctx.vector_index, &ctx.embedder, &ctx.metrics);
    let report = aggregator.check(deep).await;
    let exit_code = report.exit_code(ctx.mode);
    let data = json!({
        "status": report.status,
        "components": report.components.into_iter().map(|(name, r)| (name, json!({
            "status": r.status,
            "details": r.details,
            "metrics": r.metrics,
            "hints": r.hints,
        }))).collect::<serde_json::Map<_, _>>(),
        "metrics": report.metrics,
        "hints": report.hints,
    });
    (ExitCode::from(exit_code), data)
}

/// `quarantine` CLI sub-commands never exit `2` — exit is always 0/1 — so
/// every error path here clamps to `1` rather than using
/// `CoreError::exit_code`'s generic 0/1/2 mapping.
fn quarantine_err(e: &dyn CoreError) -> (ExitCode, Value) {
    (
        ExitCode::FAILURE,
        json!({ "status": "error", "hints": [e.to_string()], "error_code": e.error_code().to_string() }),
    )
}

pub async fn run_quarantine_scan(ctx: &AppContext, rows: &[ValidationRow]) -> (ExitCode, Value) {
    let report = validator::ValidationReport::from_scan(&ctx.config.validator, rows);
    let exit = if report.ci_gates.exit_code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    };
    (
        exit,
        json!({ "status": "ok", "hints": report.notes.clone(), "report": report }),
    )
}

pub async fn run_quarantine_quarantine(
    ctx: &AppContext,
    rows: Vec<(ValidationRow, storage::rows::ViolationCategory)>,
    description: String,
) -> (ExitCode, Value) {
    match validator::quarantine_batch(&ctx.repo, rows, description).await {
        Ok(batch_id) => ok(json!({ "batch_id": batch_id })),
        Err(e) => quarantine_err(&e),
    }
}

pub async fn run_quarantine_rollback(ctx: &AppContext, batch_id: &str) -> (ExitCode, Value) {
    match validator::rollback(&ctx.repo, Some(&ctx.vector_index), batch_id).await {
        Ok(outcome) => ok(json!({
            "restored_count": outcome.restored_count,
            "parity_delta": outcome.parity_delta.map(|d| json!({
                "missing_in_index": d.missing_in_index,
                "orphan_in_index": d.orphan_in_index,
                "delta": d.delta,
            })),
        })),
        Err(e) => quarantine_err(&e),
    }
}

pub async fn run_ci_gate(ctx: &AppContext, rows: &[ValidationRow]) -> (ExitCode, Value) {
    let report: CiGateReport = validator::ci_gate(&ctx.config.validator, rows);
    let exit = if report.exit_code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    };
    (
        exit,
        json!({
            "status": if report.exit_code == 0 { "ok" } else { "error" },
            "hints": [],
            "scanned": report.scanned,
            "failing": report.failing.iter().map(|(i, cat)| json!({ "index": i, "category": cat })).collect::<Vec<_>>(),
        }),
    )
}
