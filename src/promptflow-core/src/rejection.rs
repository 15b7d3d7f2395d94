//! Rejections: "that input was invalid, ask again".

use thiserror::Error;

/// Signal that the last input was invalid for the current prompt.
///
/// A rejection never ends a dialogue. The runner sends the rejection's
/// message back to the user and keeps collecting at the same node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Rejection {
    message: String,
}

impl Rejection {
    /// Create a rejection with the text shown to the user.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Text shown to the user.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Error returned by prompt transforms.
#[derive(Error, Debug)]
pub enum StepError {
    /// The input was invalid; re-prompt the same node.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// Anything else. Ends the run with the error preserved.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl StepError {
    /// Shorthand for `StepError::Rejected(Rejection::new(message))`.
    pub fn reject(message: impl Into<String>) -> Self {
        StepError::Rejected(Rejection::new(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_display() {
        let rejection = Rejection::new("That's not a valid number, try again.");
        assert_eq!(rejection.to_string(), "That's not a valid number, try again.");
        assert_eq!(rejection.message(), "That's not a valid number, try again.");
    }

    #[test]
    fn test_step_error_conversions() {
        let err: StepError = Rejection::new("nope").into();
        assert!(matches!(err, StepError::Rejected(ref r) if r.message() == "nope"));

        let err: StepError = anyhow::anyhow!("db down").into();
        assert!(matches!(err, StepError::Failed(_)));
        assert_eq!(err.to_string(), "db down");
    }
}
