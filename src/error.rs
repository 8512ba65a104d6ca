use std::path::PathBuf;
use thiserror::Error;

/// Configuration could not be resolved. Always raised before any connection
/// is opened, so nothing in the cluster has been touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{key}` (set `connection.{key}` in the config file or {env})")]
    Missing { key: &'static str, env: &'static str },

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("could not read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid schema catalog: {0}")]
    Catalog(String),
}

/// Why a single provisioning or verification step did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("schema mismatch on `{table}`: missing column(s) {}", .missing.join(", "))]
    SchemaMismatch { table: String, missing: Vec<String> },

    #[error("object does not exist: {0}")]
    MissingObject(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("statement timed out: {0}")]
    Timeout(String),

    #[error("statement failed: {0}")]
    Statement(String),
}

impl StepError {
    /// A fatal error leaves the session unusable; every later step is abandoned.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StepError::Connection(_))
    }

    /// Short name of the error class, as shown in the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::Connection(_) => "ConnectionError",
            StepError::Permission(_) => "PermissionError",
            StepError::SchemaMismatch { .. } => "SchemaMismatchError",
            StepError::MissingObject(_) => "MissingObjectError",
            StepError::AlreadyExists(_) => "ObjectAlreadyExists",
            StepError::Timeout(_) => "TimeoutError",
            StepError::Statement(_) => "StatementError",
        }
    }
}
