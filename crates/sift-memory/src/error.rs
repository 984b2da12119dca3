//! Error types for sift-memory.

/// Errors surfaced by vector store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Malformed document, empty id or invalid query.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Vector length differs from the store's established dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A backend failed to initialize.
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// Both the preferred and the alternate backend failed to initialize.
    #[error("no vector store available (tried {preferred}, then {alternate})")]
    NoBackendAvailable {
        preferred: &'static str,
        alternate: &'static str,
    },

    /// Index and metadata table no longer correspond; a reindex is required.
    #[error("index inconsistent, reindex required: {0}")]
    Consistency(String),

    /// Filesystem error, typically while persisting.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Collection engine error.
    #[error("collection engine error: {0}")]
    Engine(#[from] EngineError),

    /// A lock guarding the live snapshot was poisoned.
    #[error("lock poisoned: {0}")]
    Lock(String),
}

impl StoreError {
    /// Whether the caller supplied bad input (as opposed to a backend fault).
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::DimensionMismatch { .. }
        )
    }

    /// Whether the error leaves in-memory state authoritative and may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Errors reported by a collection engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// `add` was refused because some ids already exist. Nothing was written.
    #[error("ids already present: {}", .0.join(", "))]
    DuplicateIds(Vec<String>),

    #[error("collection {0} not found")]
    CollectionNotFound(String),

    #[error("collection expects dimension {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The engine has no native primitive for this operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Qdrant error: {0}")]
    Qdrant(#[from] Box<qdrant_client::QdrantError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_classification() {
        assert!(StoreError::Validation("empty id".into()).is_validation());
        assert!(
            StoreError::DimensionMismatch {
                expected: 3,
                actual: 4
            }
            .is_validation()
        );
        assert!(!StoreError::Consistency("slot 3 missing".into()).is_validation());
    }

    #[test]
    fn io_is_transient() {
        let err = StoreError::from(std::io::Error::other("disk full"));
        assert!(err.is_transient());
        assert!(!StoreError::Validation("x".into()).is_transient());
    }

    #[test]
    fn duplicate_ids_message_lists_ids() {
        let err = EngineError::DuplicateIds(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "ids already present: a, b");
    }

    #[test]
    fn no_backend_message() {
        let err = StoreError::NoBackendAvailable {
            preferred: "collection",
            alternate: "flat",
        };
        assert!(err.to_string().contains("collection"));
        assert!(err.to_string().contains("flat"));
    }
}
