//! Error types for votebattle.

use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Lookup Errors ===
    /// A record or contender does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    // === Remote Errors ===
    /// Remote storage is not configured or cannot be reached.
    #[error("Remote backend unavailable: {0}")]
    RemoteUnavailable(String),

    /// The shared table rejected a query.
    #[error("Database error: {0}")]
    Database(String),

    /// Change feed failure.
    #[error("Redis error: {0}")]
    Redis(String),

    // === Local Errors ===
    /// Local key/value store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored or received value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    // === Other ===
    /// The contender catalogue failed.
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns a stable code for logs and UI error states.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::RemoteUnavailable(_) => "REMOTE_UNAVAILABLE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

// === From implementations ===

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::NotFound(String::new()).error_code(), "NOT_FOUND");
        assert_eq!(
            AppError::RemoteUnavailable(String::new()).error_code(),
            "REMOTE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let app: AppError = err.into();
        assert_eq!(app.error_code(), "SERIALIZATION_ERROR");
    }
}
