//! Error taxonomy shared by every stage of the pipeline.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No documents were supplied")]
    NoDocuments,

    #[error("The documents contain no extractable text")]
    ExtractionEmpty,

    #[error("No index found at {}", .0.display())]
    IndexNotFound(PathBuf),

    #[error("Index at {} is corrupt: {reason}", path.display())]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("Embedding model unavailable: {0}")]
    EmbeddingModelUnavailable(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Synthesis failed: {0}")]
    SynthesisFailure(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::IndexCorrupt { path: path.into(), reason: reason.into() }
    }

    /// True for conditions the user fixes by ingesting documents first.
    pub fn needs_ingest(&self) -> bool {
        matches!(self, Self::IndexNotFound(_) | Self::IndexCorrupt { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
