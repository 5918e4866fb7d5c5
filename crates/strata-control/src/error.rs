//! # Control Error Types

use thiserror::Error;

/// Result type alias for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors raised by the control bus and the command vocabulary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    /// The text matches no entry of the command vocabulary.
    ///
    /// ## When This Occurs
    /// - An operator typed an unknown or misspelled command
    /// - A canonical word that is published internally only (`restart`,
    ///   `state`) was typed
    #[error("cannot find corresponding command")]
    UnrecognizedCommand { input: String },

    /// A topic key that is not `cmd`, `sync`, `sync-<target>` or `state`.
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Invalid bus configuration.
    #[error("Invalid bus configuration: {0}")]
    InvalidConfig(String),
}

impl ControlError {
    /// Returns true if the error was caused by operator input.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ControlError::UnrecognizedCommand { .. } | ControlError::InvalidTopic(_)
        )
    }
}
