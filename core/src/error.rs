use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    AlreadyExists,
    NotFound,
    FailedPrecondition,
    Unavailable,
    ResourceExhausted,
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::FailedPrecondition => "FAILED_PRECONDITION",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorCode::Internal => "INTERNAL",
        };
        write!(f, "{}", s)
    }
}

/// Implemented by every component error enum so the CLI-surface layer can
/// map errors to exit codes without matching on component-specific variants.
pub trait CoreError: std::error::Error {
    fn error_code(&self) -> ErrorCode;

    /// Exit code for the `search`/`quarantine` CLI surfaces: 0 never
    /// applies to an error path, 2 for everything except resource exhaustion
    /// and failed preconditions which callers may choose to retry (1).
    fn exit_code(&self) -> u8 {
        match self.error_code() {
            ErrorCode::ResourceExhausted | ErrorCode::FailedPrecondition => 1,
            _ => 2,
        }
    }
}
