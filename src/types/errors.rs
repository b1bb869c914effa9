use crate::types::models::Granularity;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid exclusion pattern: {0}")]
    BadPattern(#[from] regex::Error),

    #[error("Granularity mismatch: store holds {existing} data, operation supplies {requested}")]
    GranularityMismatch {
        existing: Granularity,
        requested: Granularity,
    },

    #[error("Corrupt coverage store '{path}': {detail}")]
    CorruptStore { path: String, detail: String },

    #[error("Unsupported store version {found} in '{path}' (expected {expected})")]
    UnsupportedVersion {
        path: String,
        found: u32,
        expected: u32,
    },

    #[error("Tracer fault: {0}")]
    TracerFault(String),

    #[error("No source available for '{0}'")]
    NoSource(String),
}

/// Non-fatal anomalies surfaced alongside otherwise-valid analysis results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The source content hash no longer matches what was measured.
    StaleSource { file: String },
    /// The file has no executable lines left after exclusion.
    NoExecutableLines { file: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::StaleSource { file } => {
                write!(f, "source of '{}' changed since measurement", file)
            }
            Warning::NoExecutableLines { file } => {
                write!(f, "'{}' has no executable lines", file)
            }
        }
    }
}
