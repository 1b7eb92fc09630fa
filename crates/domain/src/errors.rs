use crate::AbiVersion;
use thiserror::Error;

/// Opaque failure raised by a pluggable resolver.
pub type LookupError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Handshake failed: {line:?}")]
    Handshake { line: String },

    #[error("Malformed query for ABI version {version}: {line:?}")]
    QueryParse { line: String, version: AbiVersion },

    #[error("Resolver failed: {0}")]
    Resolver(#[source] LookupError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Field '{field}' is not available in ABI version {version}")]
    FieldUnavailable {
        field: &'static str,
        version: AbiVersion,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Protocol-level failures are reported to the peer with a `FAIL` line.
    /// Operational faults close the session without one.
    pub fn sends_fail(&self) -> bool {
        matches!(
            self,
            BackendError::Handshake { .. }
                | BackendError::QueryParse { .. }
                | BackendError::Resolver(_)
        )
    }

    pub fn resolver(err: impl Into<LookupError>) -> Self {
        BackendError::Resolver(err.into())
    }
}
