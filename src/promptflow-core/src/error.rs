//! Error types for dialogue runs.
//!
//! Terminal failures of a run are reported as [`DialogueError`]. Expected
//! outcomes (the user typed the exit token, or went quiet) get their own
//! variants so callers can tell them apart from genuine failures. Transport
//! level problems are reported by channels as [`ChannelError`].

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a [`Channel`](crate::channel::Channel) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel (or one of its subscriptions) has been closed.
    #[error("Channel closed")]
    Closed,

    /// Sending a message failed.
    #[error("Failed to send message: {0}")]
    Send(String),

    /// Editing a previously sent message failed.
    #[error("Failed to edit message: {0}")]
    Edit(String),

    /// Adding a reaction failed.
    #[error("Failed to react to message: {0}")]
    React(String),

    /// Subscribing to inbound events failed.
    #[error("Failed to subscribe: {0}")]
    Subscribe(String),
}

/// Result type for channel operations.
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

/// Terminal outcome of a failed dialogue run.
#[derive(Error, Debug)]
pub enum DialogueError {
    /// The user sent the exit token.
    #[error("User voluntarily exited the dialogue")]
    VoluntaryExit,

    /// No qualifying message arrived before the collector deadline.
    #[error("Dialogue closed after {}s of inactivity", after.as_secs())]
    Inactivity {
        /// Collection window that elapsed.
        after: Duration,
    },

    /// The transport failed.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// A node id that does not belong to the graph was used.
    #[error("Unknown prompt node: {0}")]
    UnknownNode(usize),

    /// A transform, visual generator or guard failed.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl DialogueError {
    /// Whether this outcome is an expected way for a dialogue to end early.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            DialogueError::VoluntaryExit | DialogueError::Inactivity { .. }
        )
    }

    /// Short machine-friendly label, used in logs and run events.
    pub fn kind(&self) -> &'static str {
        match self {
            DialogueError::VoluntaryExit => "voluntary_exit",
            DialogueError::Inactivity { .. } => "inactivity",
            DialogueError::Channel(_) => "channel",
            DialogueError::UnknownNode(_) => "unknown_node",
            DialogueError::Unexpected(_) => "unexpected",
        }
    }
}

/// Result type for dialogue runs.
pub type DialogueResult<T> = std::result::Result<T, DialogueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DialogueError::Inactivity {
            after: Duration::from_secs(90),
        };
        assert_eq!(err.to_string(), "Dialogue closed after 90s of inactivity");

        let err = DialogueError::from(ChannelError::Send("socket reset".to_string()));
        assert_eq!(
            err.to_string(),
            "Channel error: Failed to send message: socket reset"
        );
    }

    #[test]
    fn test_expected_outcomes() {
        assert!(DialogueError::VoluntaryExit.is_expected());
        assert!(
            DialogueError::Inactivity {
                after: Duration::from_secs(1)
            }
            .is_expected()
        );
        assert!(!DialogueError::Channel(ChannelError::Closed).is_expected());
        assert!(!DialogueError::Unexpected(anyhow::anyhow!("boom")).is_expected());
    }

    #[test]
    fn test_unexpected_preserves_source() {
        let err = DialogueError::from(anyhow::anyhow!("transform exploded"));
        assert_eq!(err.kind(), "unexpected");
        assert_eq!(err.to_string(), "transform exploded");
    }
}
