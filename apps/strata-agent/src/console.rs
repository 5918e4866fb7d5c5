//! Administrative command lines.
//!
//! A line is `<command>` (published on `cmd`) or `<command> <target>`
//! (published on `sync-<target>`).

use strata_control::{message_from_string, CommandMessage, ControlError, ControlResult, Topic};

/// Parses one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> ControlResult<Option<(Topic, CommandMessage)>> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let message = message_from_string(command)?;
    let topic = match (words.next(), words.next()) {
        (None, _) => Topic::Global,
        (Some(target), None) => Topic::sync(target),
        (Some(_), Some(_)) => {
            return Err(ControlError::UnrecognizedCommand {
                input: line.trim().to_string(),
            })
        }
    };
    Ok(Some((topic, message)))
}
