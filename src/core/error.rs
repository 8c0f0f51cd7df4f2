use thiserror::Error;

use super::types::Key;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Model '{0}' already defined")]
    ModelExists(String),

    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    #[error("Property '{0}' not found in model '{1}'")]
    PropertyNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Narrowing asked for rows outside the parent scope's window.
    #[error("{0}: outside range")]
    RangeError(String),

    #[error("Could not find {model} with key {key} in collection")]
    NotFound { model: String, key: Key },

    #[error("undefined method '{name}' for collection of {model}")]
    NoSuchMethod { model: String, name: String },

    #[error("Validation failed for {model}: {}", errors.join("; "))]
    ValidationFailed { model: String, errors: Vec<String> },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// Failures a bulk collection operation folds into `Ok(false)`.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::ValidationFailed { .. }
        )
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Snapshot(err.to_string())
    }
}
