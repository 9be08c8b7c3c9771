/// Structured error types for the collection pipeline
///
/// Adapter errors are absorbed at the orchestrator boundary and turned into
/// [`SourceFailure`] records; they never propagate to callers. Cache errors
/// are surfaced to the binary, except unreadable entries which degrade to a
/// cache miss.
use std::fmt;
use thiserror::Error;

/// Why a single source adapter produced no usable data
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response shape: {0}")]
    Schema(String),

    #[error("source has no record for pool {0}")]
    NotFound(String),

    #[error("source disabled by configuration")]
    Disabled,

    #[error("deadline exceeded before fetch")]
    DeadlineExceeded,
}

impl AdapterError {
    /// Short machine-readable reason code used in batch reports
    pub fn reason(&self) -> &'static str {
        match self {
            AdapterError::Timeout(_) => "timeout",
            AdapterError::Transport(_) => "transport",
            AdapterError::Schema(_) => "schema",
            AdapterError::NotFound(_) => "not_found",
            AdapterError::Disabled => "disabled",
            AdapterError::DeadlineExceeded => "deadline",
        }
    }

    /// Retrying cannot change the outcome for these variants
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AdapterError::Schema(_)
                | AdapterError::NotFound(_)
                | AdapterError::Disabled
                | AdapterError::DeadlineExceeded
        )
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// One source's failure during a fallback pass, kept for diagnostics
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source: &'static str,
    pub error: AdapterError,
}

impl SourceFailure {
    pub fn new(source: &'static str, error: AdapterError) -> Self {
        Self { source, error }
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}

/// Error types for the on-disk cache store
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("corrupt cache entry {path}: {detail}")]
    Corrupt { path: String, detail: String },
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Configuration loading errors (TOML files for config and catalog)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
