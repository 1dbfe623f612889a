//! `address:value` text commands
//!
//! Used by UI wiring and the command line to send OSC without building values
//! by hand. `"/cue/set:5"` sends the int `5` to `/cue/set`; `"/cue/next"` sends
//! an address-only message.

use crate::types::OscValue;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a text command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("command is empty")]
    Empty,
}

/// A parsed text command
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub address: String,
    pub value: Option<OscValue>,
}

impl Command {
    /// Parse `text` and prepend `prefix` to the address.
    ///
    /// The value is everything after the last `:`; a `:` at position 0 does
    /// not split. Values are tried as `i32`, then `f32`, then kept as a string.
    pub fn parse_with_prefix(text: &str, prefix: &str) -> Result<Self, CommandError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CommandError::Empty);
        }

        let (address, value) = match text.rfind(':') {
            Some(idx) if idx > 0 => (&text[..idx], Some(parse_value(&text[idx + 1..]))),
            _ => (text, None),
        };

        Ok(Self {
            address: format!("{prefix}{address}"),
            value,
        })
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_prefix(s, "")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(OscValue::String(s)) => write!(f, "{}:{}", self.address, s),
            Some(value) => write!(f, "{}:{}", self.address, value),
            None => f.write_str(&self.address),
        }
    }
}

/// Parse a command and prepend `prefix` to its address
pub fn parse_command(text: &str, prefix: &str) -> Result<Command, CommandError> {
    Command::parse_with_prefix(text, prefix)
}

/// Detect the type of a text value: int, then float, then string
pub fn parse_value(text: &str) -> OscValue {
    if let Ok(i) = text.parse::<i32>() {
        OscValue::Int(i)
    } else if let Ok(f) = text.parse::<f32>() {
        OscValue::Float(f)
    } else {
        OscValue::String(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        let cmd: Command = "/cue/set:5".parse().unwrap();
        assert_eq!(cmd.address, "/cue/set");
        assert_eq!(cmd.value, Some(OscValue::Int(5)));
    }

    #[test]
    fn test_parse_float_and_string() {
        let cmd: Command = "/light/level:0.75".parse().unwrap();
        assert_eq!(cmd.value, Some(OscValue::Float(0.75)));

        let cmd: Command = "/scene:intro".parse().unwrap();
        assert_eq!(cmd.value, Some(OscValue::String("intro".to_string())));
    }

    #[test]
    fn test_splits_on_last_colon() {
        let cmd: Command = "/net/target:10.0.0.2:9000".parse().unwrap();
        assert_eq!(cmd.address, "/net/target:10.0.0.2");
        assert_eq!(cmd.value, Some(OscValue::Int(9000)));
    }

    #[test]
    fn test_address_only_and_leading_colon() {
        let cmd: Command = "/cue/next".parse().unwrap();
        assert_eq!(cmd.value, None);

        let cmd = Command::parse_with_prefix(":7", "/show").unwrap();
        assert_eq!(cmd.address, "/show:7");
        assert_eq!(cmd.value, None);
    }

    #[test]
    fn test_prefix_is_prepended() {
        let cmd = parse_command("/cue/set:3", "/show").unwrap();
        assert_eq!(cmd.address, "/show/cue/set");
        assert_eq!(cmd.to_string(), "/show/cue/set:3");
    }

    #[test]
    fn test_empty_value_is_empty_string() {
        let cmd: Command = "/name:".parse().unwrap();
        assert_eq!(cmd.value, Some(OscValue::String(String::new())));
    }

    #[test]
    fn test_empty_command() {
        assert_eq!("".parse::<Command>(), Err(CommandError::Empty));
        assert_eq!("   ".parse::<Command>(), Err(CommandError::Empty));
    }
}
