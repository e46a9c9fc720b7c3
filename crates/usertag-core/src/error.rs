use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to persisted storage.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} is not a readable JSON object; refusing to overwrite it")]
    Unreadable(PathBuf),
}
