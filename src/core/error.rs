use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid record name: '{0}'")]
    InvalidName(String),

    #[error("Record '{0}' already exists")]
    DuplicateName(String),

    #[error("Record '{0}' not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt record file '{path}': {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Persistence queue closed")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
