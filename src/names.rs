//! Player display name validation
//!
//! Display names travel on the broadcast channel inside `PlayerJoined`
//! messages, so each client cleans them the same way before they reach the
//! roster: whitespace is trimmed, length is capped and inappropriate content
//! is rejected. Players who do not choose a name get a generated one.

use heck::ToTitleCase;
use rustrict::CensorStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Defines the style of automatically generated player names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, garde::Validate)]
pub enum NameStyle {
    /// Roman-style names (praenomen + nomen, optionally + cognomen)
    Roman(#[garde(range(min = 2, max = 3))] usize),
    /// Pet-style names (adjective + animal combinations)
    Petname(#[garde(range(min = 2, max = 3))] usize),
}

impl Default for NameStyle {
    /// Default name style is Petname with 2 words
    fn default() -> Self {
        Self::Petname(2)
    }
}

impl NameStyle {
    /// Generates a random name according to this style
    pub fn get_name(&self) -> String {
        match self {
            Self::Roman(count) => romanname::romanname(romanname::NameConfig {
                praenomen: *count > 2,
            }),
            Self::Petname(count) => petname::petname(*count as u8, " ").unwrap_or_default(),
        }
        .to_title_case()
    }
}

/// Errors that can occur during name validation
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The name is empty or contains only whitespace
    #[error("name cannot be empty")]
    Empty,
    /// The name contains inappropriate content
    #[error("name is inappropriate")]
    Sinful,
    /// The name exceeds the maximum allowed length
    #[error("name is too long")]
    TooLong,
}

/// Validates and cleans a requested display name
///
/// # Errors
///
/// * `Error::Empty` - Name is empty after trimming whitespace
/// * `Error::TooLong` - Trimmed name has more characters than allowed
/// * `Error::Sinful` - Name contains inappropriate content
pub fn sanitize(name: &str) -> Result<String, Error> {
    let name = rustrict::trim_whitespace(name);
    if name.is_empty() {
        return Err(Error::Empty);
    }
    if name.chars().count() > crate::constants::names::MAX_LENGTH {
        return Err(Error::TooLong);
    }
    if name.is_inappropriate() {
        return Err(Error::Sinful);
    }
    Ok(name.to_owned())
}

/// Cleans a requested name, falling back to a generated one when it is empty
///
/// # Errors
///
/// Returns `Error::TooLong` or `Error::Sinful` for names that are present but
/// unacceptable; an empty request is never an error.
pub fn sanitize_or_generate(name: &str, style: NameStyle) -> Result<String, Error> {
    match sanitize(name) {
        Err(Error::Empty) => Ok(style.get_name()),
        other => other,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_trims_whitespace() {
        assert_eq!(sanitize("  TestPlayer  "), Ok("TestPlayer".to_owned()));
    }

    #[test]
    fn test_sanitize_length_limit() {
        let max_name = "a".repeat(crate::constants::names::MAX_LENGTH);
        assert_eq!(sanitize(&max_name), Ok(max_name.clone()));
        let long_name = "a".repeat(crate::constants::names::MAX_LENGTH + 1);
        assert_eq!(sanitize(&long_name), Err(Error::TooLong));
    }

    #[test]
    fn test_sanitize_counts_characters_after_trimming() {
        let max = crate::constants::names::MAX_LENGTH;
        let padded = format!("   {}   ", "a".repeat(max));
        assert_eq!(sanitize(&padded), Ok("a".repeat(max)));

        let cyrillic = "Анна Петровна Иванова-Смирнова";
        assert_eq!(cyrillic.chars().count(), max);
        assert_eq!(sanitize(cyrillic), Ok(cyrillic.to_owned()));
        assert_eq!(sanitize(&format!("{cyrillic}я")), Err(Error::TooLong));
    }

    #[test]
    fn test_sanitize_empty_name() {
        assert_eq!(sanitize(""), Err(Error::Empty));
        assert_eq!(sanitize("   "), Err(Error::Empty));
        assert_eq!(sanitize("\t\n"), Err(Error::Empty));
    }

    #[test]
    fn test_sanitize_inappropriate_content() {
        for name in ["damn", "fuck", "shit"] {
            assert_eq!(
                sanitize(name),
                Err(Error::Sinful),
                "Expected '{name}' to be flagged as inappropriate"
            );
        }
    }

    #[test]
    fn test_sanitize_unicode_support() {
        let unicode_name = "Плеер测试🎮";
        assert_eq!(sanitize(unicode_name), Ok(unicode_name.to_owned()));
    }

    #[test]
    fn test_sanitize_or_generate_fills_empty_names() {
        let name = sanitize_or_generate("  ", NameStyle::Petname(2)).unwrap();
        assert!(!name.is_empty());
        assert!(name.contains(' '));

        assert_eq!(
            sanitize_or_generate("Quizmaster", NameStyle::default()),
            Ok("Quizmaster".to_owned())
        );
        assert_eq!(
            sanitize_or_generate("shit", NameStyle::default()),
            Err(Error::Sinful)
        );
    }

    #[test]
    fn test_name_style_roman_name_generation() {
        let name = NameStyle::Roman(3).get_name();
        assert!(!name.is_empty());
        assert!(name.chars().next().unwrap().is_uppercase());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Empty.to_string(), "name cannot be empty");
        assert_eq!(Error::Sinful.to_string(), "name is inappropriate");
        assert_eq!(Error::TooLong.to_string(), "name is too long");
    }
}
