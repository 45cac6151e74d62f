//! Error types shared by the message, queue and mailer modules.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by composition, queueing and dispatch.
///
/// Transport failures are deliberately absent: a backend reports failure
/// only through the `bool` returned by [`crate::Transport::deliver`].
#[derive(Debug, Error)]
pub enum MailError {
    /// Async delivery is enabled but the profile cannot support it.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A read, write, rename or delete against the queue directory failed.
    #[error("queue I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A message could not be encoded for the queue.
    #[error("failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A queue entry does not decode to a message.
    #[error("queue entry {entry} could not be decoded: {reason}")]
    Deserialization { entry: String, reason: String },

    /// A recipient address failed validation before delivery.
    #[error("invalid recipient address: {0}")]
    Validation(String),
}

impl MailError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MailError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, MailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_path() {
        let err = MailError::io(
            "/var/spool/mail-queue/1~abc",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let text = err.to_string();
        assert!(text.contains("/var/spool/mail-queue/1~abc"));
        assert!(text.contains("gone"));
    }

    #[test]
    fn test_deserialization_error_names_entry() {
        let err = MailError::Deserialization {
            entry: "42~deadbeef".to_string(),
            reason: "expected value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "queue entry 42~deadbeef could not be decoded: expected value"
        );
    }
}
