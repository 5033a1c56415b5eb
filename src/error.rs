// Error type shared by every loader and by the dataset itself. Structural problems
// (unreadable files, malformed lines, bad configuration) abort construction.
// Identifiers missing from a SMILES index are not errors: such rows are filtered out.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, DatasetError>;

#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record in {} at line {line}: {reason}", .path.display())]
    Format {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid sample index: {index} >= {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}
