//! Error type for repository operations.

use thiserror::Error;

/// Repository error variants.
///
/// The identity layer maps these into its own taxonomy before they cross
/// the trust boundary; store errors are never shown to callers directly.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated (duplicate email, token hash).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The referenced record does not exist.
    #[error("Record not found")]
    NotFound,

    /// The backing store is unreachable or failed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            StoreError::Conflict("email taken".to_string()).to_string(),
            "Conflict: email taken"
        );
        assert_eq!(StoreError::NotFound.to_string(), "Record not found");
    }
}
