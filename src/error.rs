use serde::Serialize;
use thiserror::Error;

/// Errors reported by transfer executors and ingestion.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Remote storage error: {0}")]
    Remote(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transfer cancelled")]
    Cancelled,
}

// Errors cross the UI bridge as plain strings.
impl Serialize for TransferError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
