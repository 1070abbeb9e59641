//! Database password handling.
//!
//! Uses the `secrecy` crate so connection parameters can be logged and
//! debug-printed without leaking credentials.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

/// A database password that never shows up in `Debug` or `Display` output.
pub struct Password(SecretBox<str>);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(value.into().into_boxed_str()))
    }

    /// Expose the password for building connection options.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl Default for Password {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl Clone for Password {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl PartialEq for Password {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_not_in_debug() {
        let password = Password::new("hunter2-prod");
        let debug = format!("{:?}", password);
        assert!(!debug.contains("hunter2"));
        assert_eq!(debug, "[REDACTED]");
    }

    #[test]
    fn test_clone_keeps_value() {
        let password = Password::from("s3cret");
        assert_eq!(password.clone().expose(), "s3cret");
        assert!(Password::default().is_empty());
    }
}
