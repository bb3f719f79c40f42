use scrapline_types::TransactionId;
use thiserror::Error;

/// Errors from the Scrapline kernel.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid weight: {0}")]
    InvalidWeight(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification used by transport adapters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    PreconditionFailed,
    Conflict,
    IntegrityViolation,
    Internal,
}

impl KernelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidWeight(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Self::Conflict(_) | Self::Storage(StorageError::ConcurrentConflict { .. }) => {
                ErrorKind::Conflict
            }
            Self::IntegrityViolation(_) => ErrorKind::IntegrityViolation,
            Self::Storage(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    pub fn transaction_not_found(id: &TransactionId) -> Self {
        Self::NotFound {
            kind: "transaction",
            id: id.to_string(),
        }
    }
}

/// Errors returned by persistence and blob-store ports.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Optimistic concurrency conflict: the stored version moved on.
    #[error("concurrent conflict on transaction {id}: expected version {expected_version}")]
    ConcurrentConflict { id: String, expected_version: u64 },

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type KernelResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occ_conflict_classifies_as_conflict() {
        let err = KernelError::from(StorageError::ConcurrentConflict {
            id: "t-1".into(),
            expected_version: 3,
        });
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("expected version 3"));
    }

    #[test]
    fn invalid_weight_is_a_validation_error() {
        assert_eq!(
            KernelError::InvalidWeight("tare >= gross".into()).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn not_found_display() {
        let id = TransactionId::new();
        let err = KernelError::transaction_not_found(&id);
        assert_eq!(err.to_string(), format!("transaction not found: {id}"));
    }
}
