//! Bus topics and their string keys.

use std::fmt;
use std::str::FromStr;

use crate::error::ControlError;

const GLOBAL_KEY: &str = "cmd";
const SYNC_ALL_KEY: &str = "sync";
const SYNC_PREFIX: &str = "sync-";
const STATE_KEY: &str = "state";

/// Address of a published message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    /// Broadcast to every component (`cmd`).
    Global,
    /// Every sync target (`sync`).
    SyncAll,
    /// One sync target (`sync-<target>`).
    Sync(String),
    /// State snapshots (`state`).
    State,
}

impl Topic {
    pub fn sync(target: impl Into<String>) -> Self {
        Topic::Sync(target.into())
    }

    /// String key of this topic.
    pub fn key(&self) -> String {
        match self {
            Topic::Global => GLOBAL_KEY.to_string(),
            Topic::SyncAll => SYNC_ALL_KEY.to_string(),
            Topic::Sync(target) => format!("{}{}", SYNC_PREFIX, target),
            Topic::State => STATE_KEY.to_string(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Topic {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            GLOBAL_KEY => Ok(Topic::Global),
            SYNC_ALL_KEY => Ok(Topic::SyncAll),
            STATE_KEY => Ok(Topic::State),
            _ => match s.strip_prefix(SYNC_PREFIX) {
                Some(target) if !target.is_empty() => Ok(Topic::Sync(target.to_string())),
                _ => Err(ControlError::InvalidTopic(s.to_string())),
            },
        }
    }
}
