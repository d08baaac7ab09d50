//! Error types for trawl.
//!
//! Only failures that abort a run live here. A unit that crashes or times out
//! is not an error at this level: it is recovered and turned into a result.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrawlError {
    #[error("Failed to load plugins from {source_name}: {reason}")]
    Discovery { source_name: String, reason: String },

    #[error("Report plugin '{name}' was not found. Possible reports are: {}", available.join(", "))]
    ReportNotFound { name: String, available: Vec<String> },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to spawn worker: {0}")]
    Spawn(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Report failed: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrawlError {
    /// Process exit code for this failure
    pub fn code(&self) -> i32 {
        match self {
            TrawlError::Discovery { .. } => 66,
            TrawlError::ReportNotFound { .. } => 67,
            TrawlError::InvalidArgument(_) => 64,
            TrawlError::Spawn(_) => 71,
            TrawlError::Config(_) => 78,
            TrawlError::Report(_) => 70,
            TrawlError::Io(_) => 74,
            TrawlError::Json(_) => 65,
        }
    }

    pub(crate) fn discovery(source_name: impl Into<String>, reason: impl ToString) -> Self {
        TrawlError::Discovery {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<nix::Error> for TrawlError {
    fn from(err: nix::Error) -> Self {
        TrawlError::Spawn(err.desc().to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_not_found_lists_reports() {
        let err = TrawlError::ReportNotFound {
            name: "Html".to_string(),
            available: vec!["Json".to_string(), "StdOut".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("'Html'"));
        assert!(message.contains("Json, StdOut"));
        assert_eq!(err.code(), 67);
    }

    #[test]
    fn test_discovery_error_names_source() {
        let err = TrawlError::discovery("/opt/trawl", "permission denied");
        assert_eq!(
            err.to_string(),
            "Failed to load plugins from /opt/trawl: permission denied"
        );
    }
}
