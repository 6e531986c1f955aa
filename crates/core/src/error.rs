use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PsycheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("invalid chunking parameters: overlap {overlap} must be smaller than chunk size {chunk_size} (and chunk size > 0)")]
    InvalidChunking { chunk_size: usize, overlap: usize },
    #[error("invalid index name: {0:?}")]
    InvalidIndexName(String),
    #[error("corrupt index {path:?}: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },
    #[error("embedding dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding error: {0}")]
    Embedding(String),
}

pub type Result<T> = std::result::Result<T, PsycheError>;
