//! TaskNest error taxonomy.
//!
//! Domain and validation errors propagate to the caller; transient
//! infrastructure errors (`Upstream`) are absorbed by the degradation
//! controller and only surface through the status endpoint.

use thiserror::Error;

/// Convenience result alias used across the workspace.
pub type Result<T> = std::result::Result<T, NestError>;

#[derive(Debug, Error)]
pub enum NestError {
    /// Bad caller input — rejected synchronously at save time, never retried.
    #[error("validation: {0}")]
    Validation(String),

    /// Unrecognized recurrence pattern value.
    #[error("invalid recurrence pattern: {0}")]
    InvalidRecurrence(String),

    /// The record does not exist for this owner. Cross-owner lookups
    /// resolve here too — existence is never revealed across owners.
    #[error("{0} not found")]
    NotFound(String),

    /// Key-value store failure.
    #[error("store: {0}")]
    Store(String),

    /// A stored record failed to decode. The specific operation fails;
    /// traffic for other keys and owners is unaffected.
    #[error("corrupt record at {0}")]
    Corrupt(String),

    /// External job service or broker unreachable / timed out.
    #[error("upstream: {0}")]
    Upstream(String),

    /// Configuration file problems.
    #[error("config: {0}")]
    Config(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl NestError {
    /// Not-found check used by callers that treat absence as a no-op.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NestError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(NestError::NotFound("task".into()).is_not_found());
        assert!(!NestError::Validation("bad".into()).is_not_found());
    }

    #[test]
    fn test_display_messages() {
        let e = NestError::InvalidRecurrence("fortnightly".into());
        assert_eq!(e.to_string(), "invalid recurrence pattern: fortnightly");
        let e = NestError::NotFound("task".into());
        assert_eq!(e.to_string(), "task not found");
    }
}
