//! Error types for the llmmerge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for the driver entry point,
//! which maps every variant onto a process exit code.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl CoreError {
    /// Exit status reported to Git for this error.
    ///
    /// Unsupported content exits like an unresolved conflict (1) so Git
    /// falls back to its own strategy for the file. Configuration and I/O
    /// problems exit with 2.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Content(_) | Self::Backend(_) => 1,
            Self::Config(_) | Self::Resolve(_) => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Content errors
// ---------------------------------------------------------------------------

/// Input files the driver refuses to merge as text.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The file contains NUL bytes.
    #[error("unsupported content: '{}' looks like a binary file", path.display())]
    Binary { path: PathBuf },

    /// The file is not valid UTF-8.
    #[error("unsupported content: '{}' is not valid UTF-8", path.display())]
    NotUtf8 { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Backend errors
// ---------------------------------------------------------------------------

/// Errors from a completion backend call or from interpreting its reply.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("backend HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service returned a non-success status code.
    #[error("backend API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// The call did not finish within the configured bound.
    #[error("backend '{backend}' timed out after {secs}s")]
    Timeout { backend: String, secs: u64 },

    /// The reply could not be turned into replacement text.
    #[error("malformed backend reply: {0}")]
    Malformed(String),

    /// The model explicitly declined to resolve the region.
    #[error("backend declined to resolve: {0}")]
    Declined(String),
}

impl BackendError {
    /// `true` for transport, auth and timeout failures, as opposed to a
    /// reply that arrived but was unusable.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout { .. } => true,
            Self::Api { status, .. } => matches!(*status, 401 | 403 | 429) || *status >= 500,
            Self::Malformed(_) | Self::Declined(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution errors
// ---------------------------------------------------------------------------

/// Fatal file-system errors while resolving one file.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// An input file could not be read.
    #[error("failed to read '{}': {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The merged output could not be written.
    #[error("failed to write '{}': {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
