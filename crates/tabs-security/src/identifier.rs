//! Tab identifier validation.
//!
//! Identifiers cross the URL boundary, so they are checked before any
//! registry lookup: 1 to 50 characters from `[A-Za-z0-9_-]`.

use std::fmt;

/// Maximum identifier length.
pub const MAX_ID_LEN: usize = 50;

/// Reason an identifier was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidIdentifier {
    #[error("tab id is empty")]
    Empty,
    #[error("tab id is {0} characters long (max {MAX_ID_LEN})")]
    TooLong(usize),
    #[error("tab id contains invalid character {0:?}")]
    InvalidChar(char),
}

/// A validated tab identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TabId(String);

impl TabId {
    /// Validate `raw` as a tab identifier.
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
        validate(raw)?;
        Ok(Self(raw.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for TabId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check `raw` against the identifier format without allocating.
pub fn validate(raw: &str) -> Result<(), InvalidIdentifier> {
    if raw.is_empty() {
        return Err(InvalidIdentifier::Empty);
    }
    if let Some(c) = raw
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(InvalidIdentifier::InvalidChar(c));
    }
    // All ASCII past this point, so bytes == chars
    if raw.len() > MAX_ID_LEN {
        return Err(InvalidIdentifier::TooLong(raw.len()));
    }
    Ok(())
}

/// Whether `raw` is a well-formed identifier.
#[must_use]
pub fn is_valid(raw: &str) -> bool {
    validate(raw).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_valid_ids() {
        for id in ["a", "profile", "tab_1", "my-tab", "ABC-def_09"] {
            assert_eq!(TabId::parse(id).unwrap().as_str(), id);
        }
        assert!(is_valid(&"x".repeat(MAX_ID_LEN)));
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(TabId::parse(""), Err(InvalidIdentifier::Empty));
    }

    #[test]
    fn test_rejects_too_long() {
        let raw = "x".repeat(MAX_ID_LEN + 1);
        assert_eq!(TabId::parse(&raw), Err(InvalidIdentifier::TooLong(51)));
    }

    #[test]
    fn test_rejects_path_traversal() {
        assert_eq!(
            TabId::parse("../../etc"),
            Err(InvalidIdentifier::InvalidChar('.'))
        );
    }

    #[test]
    fn test_rejects_markup_and_unicode() {
        assert!(!is_valid("<script>"));
        assert!(!is_valid("tab id"));
        assert!(!is_valid("tab%20"));
        assert!(!is_valid("café"));
    }
}
