//! Thin facade wiring C1 (`storage`), C2 (`validator`), C4 (`embedding`),
//! C5 (vector index, via `storage::vector_index`), C6 (`retrieval`), and C7
//! (`health`) behind a CLI-surface contract. The CLI/MCP binaries
//! themselves stay out of scope; this crate only exposes the `run_*`
//! functions an external binary would wrap.

pub mod context;
pub mod ingest;
pub mod operations;
pub mod requests;

pub use context::{AppContext, BootstrapError};
pub use ingest::{embed_and_index, ingest_document, ingest_email_thread, DocumentIngestOutcome, IngestError};
pub use operations::{
    run_admin_health, run_ci_gate, run_quarantine_quarantine, run_quarantine_rollback,
    run_quarantine_scan, run_search_hybrid, run_search_literal, run_search_semantic,
};
pub use requests::{HybridSearchRequest, LiteralSearchRequest, SearchFiltersInput, SemanticSearchRequest};
