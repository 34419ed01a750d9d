//! Application-wide error types.

use std::path::PathBuf;

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// Job-level failures are caught and logged at the job boundary; the next
/// scheduled trigger is the only retry mechanism.
#[derive(Error, Debug)]
pub enum Error {
    /// The image source could not be reached.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The image source answered with a non-success status.
    #[error("remote returned status {status}")]
    RemoteStatus { status: u16 },

    /// An assembly partition holds no images to encode.
    #[error("no images found in {}", dir.display())]
    EmptyPartition { dir: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The external encoder failed.
    #[error("encoding failed: {0}")]
    Encode(String),

    /// The artifact catalog rejected an operation.
    #[error("catalog error: {0}")]
    Catalog(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
