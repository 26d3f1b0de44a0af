use thiserror::Error;

/// Canonical error type for run lifecycle operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Caller input was rejected before any side effect took place.
    #[error("validation error: {0}")]
    Validation(String),

    /// A run is already in progress.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Entity was not found in the run store (or nothing is running).
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"run"`).
        entity: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// The load engine or the metrics backend did not answer successfully.
    #[error("engine unavailable: {message}")]
    EngineUnavailable {
        /// Human-readable details of the failed call.
        message: String,
    },

    /// The durable store rejected a read or write.
    #[error("persistence error: {message}")]
    Persistence {
        /// Human-readable details for debugging purposes.
        message: String,
    },

    /// I/O error occurred while publishing a scenario artifact.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Creates a `Validation` variant.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a `Conflict` variant.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates an `EngineUnavailable` variant.
    #[must_use]
    pub fn engine_unavailable(message: impl Into<String>) -> Self {
        Self::EngineUnavailable {
            message: message.into(),
        }
    }

    /// Creates a `Persistence` variant.
    #[must_use]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Returns `true` for errors caused by caller input rather than the system.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Conflict(_) | Self::NotFound { .. }
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
