use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid preference {field}: {reason}")]
    InvalidPreference { field: &'static str, reason: String },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
