//! Error taxonomy for migration operations

use thiserror::Error;

use crate::remote::RemoteError;

/// Errors surfaced to callers of the migration service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    /// Missing or malformed input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unknown migration id or invalid space id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Start requested for a migration that is not in `created` status
    #[error("Migration {id} cannot be started from status {status}")]
    AlreadyStarted { id: String, status: String },

    /// The remote content client rejected a call
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),
}

impl MigrationError {
    pub fn validation(msg: impl Into<String>) -> Self {
        MigrationError::Validation(msg.into())
    }

    pub fn migration_not_found(id: &str) -> Self {
        MigrationError::NotFound(format!("migration {}", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_converts() {
        let err: MigrationError = RemoteError::Timeout.into();
        assert_eq!(err.to_string(), "Remote call failed: Request timed out");
    }

    #[test]
    fn test_already_started_message() {
        let err = MigrationError::AlreadyStarted {
            id: "m1".into(),
            status: "running".into(),
        };
        assert_eq!(
            err.to_string(),
            "Migration m1 cannot be started from status running"
        );
    }
}
