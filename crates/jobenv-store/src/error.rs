//! Store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record source unavailable: {0}")]
    Unavailable(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Surface a read failure to the builder as a fatal secret store error.
    pub fn into_core(self, level: &str) -> jobenv_core::Error {
        jobenv_core::Error::SecretStore {
            level: level.to_string(),
            message: self.to_string(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
