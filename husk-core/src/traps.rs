//! Trap conditions and the session's trap handler table.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::{Error, ErrorKind};

pub(crate) use nix::sys::signal::Signal;

/// A condition a trap handler can be attached to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TrapCondition {
    /// An OS signal.
    Signal(Signal),
    /// Before every simple command.
    Debug,
    /// After any command with non-zero status (outside condition contexts).
    Err,
    /// When the run (or an explicit `exit`) completes.
    Exit,
    /// When a function or sourced script returns.
    Return,
}

impl Display for TrapCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Signal names are printed without the SIG prefix, as bash does.
            Self::Signal(s) => {
                f.write_str(s.as_str().strip_prefix("SIG").unwrap_or(s.as_str()))
            }
            Self::Debug => f.write_str("DEBUG"),
            Self::Err => f.write_str("ERR"),
            Self::Exit => f.write_str("EXIT"),
            Self::Return => f.write_str("RETURN"),
        }
    }
}

impl TrapCondition {
    /// Iterates over all trappable conditions.
    pub fn iterator() -> impl Iterator<Item = Self> {
        const SPECIAL: &[TrapCondition] = &[
            TrapCondition::Debug,
            TrapCondition::Err,
            TrapCondition::Exit,
            TrapCondition::Return,
        ];

        SPECIAL
            .iter()
            .copied()
            .chain(Signal::iterator().map(TrapCondition::Signal))
    }

    /// Returns the condition's signal number, for conditions that have one.
    pub const fn signal_number(self) -> Option<i32> {
        match self {
            Self::Signal(s) => Some(s as i32),
            Self::Exit => Some(0),
            _ => None,
        }
    }
}

impl FromStr for TrapCondition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if let Ok(n) = s.parse::<i32>() {
            Self::try_from(n)
        } else {
            Self::try_from(s)
        }
    }
}

impl TryFrom<i32> for TrapCondition {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Exit),
            value => Ok(Self::Signal(Signal::try_from(value).map_err(|_| {
                ErrorKind::InvalidSignal(value.to_string())
            })?)),
        }
    }
}

impl TryFrom<&str> for TrapCondition {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Error> {
        let mut s = value.to_ascii_uppercase();

        match s.as_str() {
            "DEBUG" => Ok(Self::Debug),
            "ERR" => Ok(Self::Err),
            "EXIT" => Ok(Self::Exit),
            "RETURN" => Ok(Self::Return),
            _ => {
                // Accept names with or without the SIG prefix.
                if !s.starts_with("SIG") {
                    s.insert_str(0, "SIG");
                }
                Signal::from_str(s.as_str())
                    .map(TrapCondition::Signal)
                    .map_err(|_| ErrorKind::InvalidSignal(value.to_owned()).into())
            }
        }
    }
}

/// The session's registered trap handlers.
#[derive(Clone, Default)]
pub struct TrapHandlers {
    /// Handler source text per condition. An empty string means the
    /// condition is explicitly ignored; a missing key means default
    /// disposition.
    pub(crate) handlers: HashMap<TrapCondition, String>,
    /// Re-entrancy depth of handler execution.
    pub(crate) handler_depth: i32,
}

impl TrapHandlers {
    /// Looks up the handler for a condition.
    pub fn get_handler(&self, condition: TrapCondition) -> Option<&str> {
        self.handlers.get(&condition).map(|s| s.as_str())
    }

    /// Registers a handler.
    pub fn register_handler(&mut self, condition: TrapCondition, command: String) {
        self.handlers.insert(condition, command);
    }

    /// Removes a handler, restoring default disposition.
    pub fn remove_handler(&mut self, condition: TrapCondition) {
        self.handlers.remove(&condition);
    }

    /// Iterates over registered handlers.
    pub fn iter_handlers(&self) -> impl Iterator<Item = (TrapCondition, &str)> {
        self.handlers
            .iter()
            .map(|(condition, command)| (*condition, command.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_condition_names_and_numbers() {
        assert_eq!("EXIT".parse::<TrapCondition>().unwrap(), TrapCondition::Exit);
        assert_eq!("0".parse::<TrapCondition>().unwrap(), TrapCondition::Exit);
        assert_eq!(
            "INT".parse::<TrapCondition>().unwrap(),
            TrapCondition::Signal(Signal::SIGINT)
        );
        assert_eq!(
            "SIGTERM".parse::<TrapCondition>().unwrap(),
            TrapCondition::Signal(Signal::SIGTERM)
        );
        assert_eq!(
            "sigusr1".parse::<TrapCondition>().unwrap(),
            TrapCondition::Signal(Signal::SIGUSR1)
        );
        assert!("NOSUCH".parse::<TrapCondition>().is_err());
    }

    #[test]
    fn display_strips_sig_prefix() {
        assert_eq!(
            TrapCondition::Signal(Signal::SIGINT).to_string(),
            "INT"
        );
        assert_eq!(TrapCondition::Exit.to_string(), "EXIT");
    }

    #[test]
    fn handler_table() {
        let mut traps = TrapHandlers::default();
        traps.register_handler(TrapCondition::Exit, "echo bye".into());
        assert_eq!(traps.get_handler(TrapCondition::Exit), Some("echo bye"));

        traps.register_handler(TrapCondition::Exit, String::new());
        assert_eq!(traps.get_handler(TrapCondition::Exit), Some(""));

        traps.remove_handler(TrapCondition::Exit);
        assert!(traps.get_handler(TrapCondition::Exit).is_none());
    }
}
