use thiserror::Error;

use causerie_shared::CoreError;

/// Errors produced by the store layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced document does not exist.
    #[error("document not found")]
    NotFound,

    /// A create with an explicit id hit an existing document.
    #[error("document already exists")]
    AlreadyExists,

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored document does not match the expected schema.
    #[error("malformed document: {0}")]
    InvalidDocument(String),
}

/// Convenience alias used throughout the crate.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// `AlreadyExists` is intercepted where it is meaningful (nickname
// reservation); the blanket mapping below only covers call sites that never
// expect it.
impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => CoreError::NotFound("document".to_string()),
            StoreError::AlreadyExists => {
                CoreError::Validation("document already exists".to_string())
            }
            StoreError::Unavailable(msg) => CoreError::Unavailable(msg),
            StoreError::InvalidDocument(msg) => {
                CoreError::Unavailable(format!("malformed document: {msg}"))
            }
        }
    }
}
