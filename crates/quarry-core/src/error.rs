//! Error types for Quarry.

use thiserror::Error;

/// Top-level result type for Quarry operations.
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Top-level error type for Quarry.
#[derive(Debug, Error)]
pub enum QuarryError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    /// A source data file that does not exist or cannot be read.
    #[error("Source file not found or not accessible: {0}")]
    SourceNotFound(String),

    #[error(
        "Source file must be inside the configured root ({root}), got {path}. \
         To allow outside paths set QUARRY_ALLOW_OUTSIDE_ROOT=true."
    )]
    OutsideBoundary { path: String, root: String },

    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("config error: {0}")]
    Config(String),
}

/// Failures talking to the external analysis service.
///
/// Carries strings rather than transport errors so the taxonomy stays
/// independent of the HTTP client in use.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("analysis service unreachable: {0}")]
    Transport(String),

    #[error("analysis service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("analysis service timed out after {0}ms")]
    Timeout(u64),

    #[error("analysis service returned a non-JSON body: {0}")]
    Decode(String),
}

/// Client-facing classification of a [`QuarryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    SourceNotFound,
    OutsideBoundary,
    Upstream,
    Internal,
}

impl QuarryError {
    /// Classify this error for callers that map errors to status codes.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::SourceNotFound(_) => ErrorKind::SourceNotFound,
            Self::OutsideBoundary { .. } => ErrorKind::OutsideBoundary,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Store(_) | Self::Io(_) | Self::Serialization(_) | Self::Config(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// `NotFound` for a project id that has no record.
    #[must_use]
    pub fn project_not_found(id: &str) -> Self {
        Self::NotFound(format!("Project not found: {id}"))
    }
}

impl From<serde_json::Error> for QuarryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
