//! # Endpoint Error Types
//!
//! Error types for endpoint resolution and endpoint operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Endpoint Error Categories                          │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Parse/Config   │  │   Capability    │  │     Delegation          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidUri     │  │  Unsupported    │  │  Delegate {code, msg}   │ │
//! │  │  MissingCreds   │  │  ReadOnly       │  │  NotFound               │ │
//! │  │  MissingParam   │  │  EmptyWrite     │  │  Io                     │ │
//! │  │  UnsupportedSch │  │  InvalidNode    │  │  Cancelled              │ │
//! │  │  BackendUnavail │  │                 │  │  Internal               │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This layer never retries. Every error reaches the immediate caller; the
//! only remapping is "not found" turning into success for deletes.

use strata_core::ValidationError;
use thiserror::Error;

/// Result type alias for endpoint operations.
pub type EndpointResult<T> = Result<T, EndpointError>;

/// Endpoint error type covering resolution and operation failures.
#[derive(Debug, Error)]
pub enum EndpointError {
    // =========================================================================
    // Parse / Validation Errors
    // =========================================================================
    /// The connection string could not be parsed.
    #[error("Invalid endpoint URI: {0}")]
    InvalidUri(String),

    /// The URI carries no credentials where they are mandatory.
    #[error("{0}")]
    MissingCredentials(&'static str),

    /// A mandatory query parameter or path component is missing.
    #[error("{0}")]
    MissingParameter(&'static str),

    /// No backend is registered for this scheme.
    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),

    /// The scheme is valid but no collaborator was wired for it.
    #[error("No backend wired for scheme '{scheme}'")]
    BackendUnavailable { scheme: String },

    /// Invalid input rejected by a core type.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Capability Errors
    // =========================================================================
    /// The backend does not implement this capability.
    #[error("{operation} is not supported by this endpoint")]
    Unsupported { operation: &'static str },

    /// Mutation attempted on a browse-only endpoint.
    #[error("Endpoint is browse-only, cannot {operation}")]
    ReadOnly { operation: &'static str },

    /// Zero-byte writes are refused by contract.
    #[error("cannot create empty files: {path}")]
    EmptyWrite { path: String },

    /// The node is not valid for the requested operation.
    #[error("Invalid node {path}: {reason}")]
    InvalidNode { path: String, reason: String },

    // =========================================================================
    // Delegation Errors
    // =========================================================================
    /// No node exists at this path.
    #[error("Node not found: {0}")]
    NotFound(String),

    /// Failure reported by a delegate service, with its status code if any.
    #[error("Delegate error{}: {message}", code_suffix(.code))]
    Delegate { code: Option<u16>, message: String },

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller's cancellation signal fired.
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal endpoint error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn code_suffix(code: &Option<u16>) -> String {
    code.map(|c| format!(" ({})", c)).unwrap_or_default()
}

// =============================================================================
// Constructors
// =============================================================================

impl EndpointError {
    /// Creates a `Delegate` error with a status code.
    pub fn delegate(code: u16, message: impl Into<String>) -> Self {
        EndpointError::Delegate {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Creates a `NotFound` error for a path.
    pub fn not_found(path: impl Into<String>) -> Self {
        EndpointError::NotFound(path.into())
    }

    /// Creates an `InvalidNode` error.
    pub fn invalid_node(path: impl Into<String>, reason: impl Into<String>) -> Self {
        EndpointError::InvalidNode {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<url::ParseError> for EndpointError {
    fn from(err: url::ParseError) -> Self {
        EndpointError::InvalidUri(err.to_string())
    }
}

impl From<serde_json::Error> for EndpointError {
    fn from(err: serde_json::Error) -> Self {
        EndpointError::Internal(format!("marker payload: {}", err))
    }
}

impl From<walkdir::Error> for EndpointError {
    fn from(err: walkdir::Error) -> Self {
        match err.into_io_error() {
            Some(io) => EndpointError::Io(io),
            None => EndpointError::Internal("filesystem loop detected".into()),
        }
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl EndpointError {
    /// Returns true for "nothing exists at this path", whichever layer said so.
    pub fn is_not_found(&self) -> bool {
        match self {
            EndpointError::NotFound(_) => true,
            EndpointError::Delegate { code: Some(404), .. } => true,
            EndpointError::Io(io) => io.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Returns true when the backend lacks the capability, as opposed to a
    /// transient or delegated failure.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, EndpointError::Unsupported { .. })
    }

    /// Returns true for parse/validation failures raised while resolving a URI.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EndpointError::InvalidUri(_)
                | EndpointError::MissingCredentials(_)
                | EndpointError::MissingParameter(_)
                | EndpointError::UnsupportedScheme(_)
                | EndpointError::BackendUnavailable { .. }
                | EndpointError::Validation(_)
        )
    }
}
