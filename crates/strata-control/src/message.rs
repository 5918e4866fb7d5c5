//! # Command Messages
//!
//! The enumerated lifecycle instructions carried by the bus, and the text
//! vocabulary operators use to issue them.
//!
//! ## Vocabulary
//! ```text
//! ┌──────────────────┬──────────────┬──────────────────────────────────────┐
//! │ text             │ message      │ expected subscriber reaction         │
//! ├──────────────────┼──────────────┼──────────────────────────────────────┤
//! │ "exit", "quit"   │ Halt         │ stop everything                      │
//! │ "resync"         │ Resync       │ full resynchronization               │
//! │ "dry"            │ ResyncDry    │ full resynchronization, no writes    │
//! │ "loop"           │ SyncLoop     │ snapshot check / force-resync        │
//! │ "enable"         │ Enable       │ enable one sync target               │
//! │ "disable"        │ Disable      │ disable one sync target              │
//! │ "pause"          │ Pause        │ pause all syncs                      │
//! │ "resume"         │ Resume       │ resume all syncs                     │
//! └──────────────────┴──────────────┴──────────────────────────────────────┘
//! ```
//!
//! `Restart` and `PublishState` are published by components, never typed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// One lifecycle instruction. Carries no payload; the topic addresses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandMessage {
    Halt,
    Restart,
    Pause,
    Resume,
    Enable,
    Disable,
    SyncLoop,
    Resync,
    ResyncDry,
    PublishState,
}

/// Every accepted word and the message it maps to.
pub const VOCABULARY: &[(&str, CommandMessage)] = &[
    ("exit", CommandMessage::Halt),
    ("quit", CommandMessage::Halt),
    ("resync", CommandMessage::Resync),
    ("dry", CommandMessage::ResyncDry),
    ("loop", CommandMessage::SyncLoop),
    ("enable", CommandMessage::Enable),
    ("disable", CommandMessage::Disable),
    ("pause", CommandMessage::Pause),
    ("resume", CommandMessage::Resume),
];

/// Maps a command word to its message. Matching is exact.
pub fn message_from_string(text: &str) -> ControlResult<CommandMessage> {
    VOCABULARY
        .iter()
        .find(|(word, _)| *word == text)
        .map(|(_, message)| *message)
        .ok_or_else(|| ControlError::UnrecognizedCommand {
            input: text.to_string(),
        })
}

impl CommandMessage {
    /// Canonical word of this message.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandMessage::Halt => "exit",
            CommandMessage::Restart => "restart",
            CommandMessage::Pause => "pause",
            CommandMessage::Resume => "resume",
            CommandMessage::Enable => "enable",
            CommandMessage::Disable => "disable",
            CommandMessage::SyncLoop => "loop",
            CommandMessage::Resync => "resync",
            CommandMessage::ResyncDry => "dry",
            CommandMessage::PublishState => "state",
        }
    }

    /// True for messages that start a sync pass.
    pub fn triggers_sync(&self) -> bool {
        matches!(
            self,
            CommandMessage::Resync | CommandMessage::ResyncDry | CommandMessage::SyncLoop
        )
    }
}

impl fmt::Display for CommandMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandMessage {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        message_from_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_is_exhaustive() {
        let expected = [
            ("exit", CommandMessage::Halt),
            ("quit", CommandMessage::Halt),
            ("resync", CommandMessage::Resync),
            ("dry", CommandMessage::ResyncDry),
            ("loop", CommandMessage::SyncLoop),
            ("enable", CommandMessage::Enable),
            ("disable", CommandMessage::Disable),
            ("pause", CommandMessage::Pause),
            ("resume", CommandMessage::Resume),
        ];
        for (word, message) in expected {
            assert_eq!(message_from_string(word), Ok(message), "word {:?}", word);
        }
        assert_eq!(VOCABULARY.len(), expected.len());
    }

    #[test]
    fn test_unknown_words_fail() {
        for word in ["", "EXIT", " pause", "restart", "state", "halt", "resync now"] {
            let err = message_from_string(word).unwrap_err();
            assert_eq!(err.to_string(), "cannot find corresponding command");
        }
    }

    #[test]
    fn test_display_round_trips_for_typed_words() {
        for (_, message) in VOCABULARY {
            assert_eq!(message.to_string().parse::<CommandMessage>(), Ok(*message));
        }
        assert_eq!(CommandMessage::Restart.to_string(), "restart");
        assert_eq!(CommandMessage::PublishState.to_string(), "state");
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&CommandMessage::ResyncDry).unwrap();
        assert_eq!(json, "\"resync_dry\"");
    }
}
