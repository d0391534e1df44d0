use thiserror::Error;

use crate::bids::BidStatus;
use crate::tasks::TaskStatus;

/// Failures reported by the document/blob collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A write precondition (expected version or absence) did not hold.
    #[error("write conflict on {collection}/{id}")]
    Conflict { collection: String, id: String },

    /// Network or backend unavailability; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored document could not be mapped to or from JSON.
    #[error("malformed document {collection}/{id}: {reason}")]
    Malformed {
        collection: String,
        id: String,
        reason: String,
    },

    /// Any other backend failure.
    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Unavailable(_))
    }
}

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, KlusError>;

/// Everything a lifecycle operation can fail with.
///
/// Validation and precondition errors are raised before any write is
/// attempted. Store errors are the only ones worth retrying.
#[derive(Error, Debug)]
pub enum KlusError {
    /// Missing or malformed input.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("task is not open (status: {status})")]
    TaskNotOpen { status: TaskStatus },

    #[error("bid is not pending (status: {status})")]
    BidNotPending { status: BidStatus },

    #[error("klusser {klusser_id} already has a bid on this task")]
    DuplicateBid { klusser_id: String },

    #[error("invalid task transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("task can no longer be deleted (status: {status})")]
    NotDeletable { status: TaskStatus },

    #[error("a contact phone number is required before bidding")]
    MissingPhone,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("not authenticated")]
    Unauthenticated,

    /// Sign-up with an e-mail address that already has an account.
    #[error("an account already exists for {email}")]
    AccountExists { email: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("identity provider error: {0}")]
    Identity(String),

    #[error("blob store error: {0}")]
    Blob(String),

    #[error("image processing failed: {0}")]
    Media(#[from] image::ImageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KlusError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        KlusError::NotFound { kind, id: id.into() }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            KlusError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// True for errors caused by the current task or bid state rather than by the input.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            KlusError::TaskNotOpen { .. }
                | KlusError::BidNotPending { .. }
                | KlusError::DuplicateBid { .. }
                | KlusError::InvalidTransition { .. }
                | KlusError::NotDeletable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_and_outages_are_retryable() {
        let conflict = KlusError::from(StoreError::Conflict {
            collection: "tasks".into(),
            id: "t1".into(),
        });
        assert!(conflict.is_retryable());
        assert!(KlusError::from(StoreError::Unavailable("timeout".into())).is_retryable());
        assert!(!KlusError::from(StoreError::Backend("bad".into())).is_retryable());
        assert!(!KlusError::Validation("amount".into()).is_retryable());
        assert!(!KlusError::MissingPhone.is_retryable());
    }

    #[test]
    fn precondition_classification() {
        assert!(KlusError::TaskNotOpen { status: TaskStatus::Assigned }.is_precondition());
        assert!(KlusError::DuplicateBid { klusser_id: "k".into() }.is_precondition());
        assert!(!KlusError::Forbidden("x".into()).is_precondition());
        assert!(!KlusError::AccountExists { email: "jan@example.nl".into() }.is_retryable());
    }

    #[test]
    fn messages_name_the_state() {
        let err = KlusError::TaskNotOpen { status: TaskStatus::Completed };
        assert_eq!(err.to_string(), "task is not open (status: completed)");
    }
}
