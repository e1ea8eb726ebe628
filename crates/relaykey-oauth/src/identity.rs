//! Account identity used to key persisted tokens.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The sender's email address.
///
/// Only a light check is done: an `@` must be present, and since the value
/// ends up inside a file name it may not contain path separators or control
/// characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Validates and wraps an email address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the value is not usable.
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let usable = value.contains('@')
            && !value.starts_with('.')
            && !value
                .chars()
                .any(|c| c == '/' || c == '\\' || c.is_control() || c.is_whitespace());
        if usable {
            Ok(Self(value))
        } else {
            Err(Error::InvalidIdentity(value))
        }
    }

    /// Returns the address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_email_addresses() {
        for addr in ["user@gmail.com", "first.last+tag@example.org", "a@b"] {
            assert_eq!(Identity::parse(addr).unwrap().as_str(), addr);
        }
    }

    #[test]
    fn test_rejects_non_addresses() {
        for addr in [
            "",
            "user",
            "../../etc/passwd@x",
            "user@exa/mple.com",
            "user@example.com\n",
            "us er@example.com",
            ".hidden@example.com",
            "user@ex\\ample.com",
        ] {
            assert!(
                matches!(Identity::parse(addr), Err(Error::InvalidIdentity(_))),
                "{addr:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_str() {
        let identity: Identity = "me@example.com".parse().unwrap();
        assert_eq!(identity.to_string(), "me@example.com");
    }
}
