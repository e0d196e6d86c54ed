//! Session identifiers
//!
//! Several sessions may share one broadcast bus. Every envelope carries the
//! id of the session it belongs to and clients drop traffic for any other
//! session. Ids are five octal digits so they are easy to read out loud when
//! inviting players.

use std::{fmt::Display, str::FromStr};

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

/// Smallest five-digit octal value
const MIN_VALUE: u16 = 0o10_000;
/// One past the largest five-digit octal value
const MAX_VALUE: u16 = 0o100_000;

/// A short identifier for one quiz session
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub struct SessionId(u16);

/// Errors raised when parsing a session id typed in by a player
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The text is not an octal number
    #[error("session id must be octal: {0}")]
    NotOctal(#[from] std::num::ParseIntError),
    /// The number does not have five octal digits
    #[error("session id must have five digits")]
    OutOfRange,
}

impl SessionId {
    /// Creates a new random session ID
    pub fn new() -> Self {
        Self(fastrand::u16(MIN_VALUE..MAX_VALUE))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:05o}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ParseError;

    /// Parses the five-digit octal form, ignoring surrounding whitespace
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = u16::from_str_radix(s.trim(), 8)?;
        if (MIN_VALUE..MAX_VALUE).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ParseError::OutOfRange)
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_have_five_digits() {
        for _ in 0..100 {
            assert_eq!(SessionId::new().to_string().len(), 5);
        }
    }

    #[test]
    fn test_display_bounds() {
        assert_eq!(SessionId(MIN_VALUE).to_string(), "10000");
        assert_eq!(SessionId(MAX_VALUE - 1).to_string(), "77777");
    }

    #[test]
    fn test_parse() {
        assert_eq!(" 12345 ".parse::<SessionId>(), Ok(SessionId(0o12345)));
        assert!(matches!("888".parse::<SessionId>(), Err(ParseError::NotOctal(_))));
        assert_eq!("777".parse::<SessionId>(), Err(ParseError::OutOfRange));
        assert!("".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_wire_form_is_a_string() {
        let id = SessionId(0o12345);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"12345\"");
        assert_eq!(serde_json::from_str::<SessionId>(&json).unwrap(), id);

        assert!(serde_json::from_str::<SessionId>("123").is_err());
        assert!(serde_json::from_str::<SessionId>("\"00001\"").is_err());
    }
}
