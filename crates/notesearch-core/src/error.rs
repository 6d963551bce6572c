use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage failure at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index not built yet. Run `index` first.")]
    IndexNotBuilt,

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A single document could not be read. Recovered by the chunker, which
    /// skips the file and keeps going.
    #[error("Skipping {}: {reason}", path.display())]
    PartialInput { path: PathBuf, reason: String },

    #[error("Embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),
}

impl Error {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
