//! Error types for jobenv.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A secret variable store could not be read. Never swallowed by the builder.
    #[error("secret variable store unavailable ({level}): {message}")]
    SecretStore { level: String, message: String },

    #[error("deployment variables unavailable: {0}")]
    Deployment(String),

    #[error("kubeconfig generation failed: {0}")]
    Kubeconfig(String),
}

impl Error {
    /// Whether this failure must reach the builder's caller instead of
    /// degrading to an empty step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::SecretStore { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
