//! Validated participant identifiers.
//!
//! A `UserId` doubles as a filesystem and queue-name component, so the
//! character set is restricted up front instead of at every use site.

use std::fmt;

/// Maximum identifier payload in bytes (excluding the NUL the wire form adds).
pub const USER_ID_MAX: usize = 31;

/// A validated participant identifier.
///
/// Accepted: non-empty, at most [`USER_ID_MAX`] bytes, no `/`, no NUL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    /// Parse and validate a raw identifier.
    pub fn parse(raw: &str) -> Result<Self, UserIdError> {
        if raw.is_empty() {
            return Err(UserIdError::Empty);
        }
        if raw.len() > USER_ID_MAX {
            return Err(UserIdError::TooLong);
        }
        if raw.bytes().any(|b| b == b'/' || b == 0) {
            return Err(UserIdError::InvalidChar);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The message queue name this peer receives on: `/queue_<id>`.
    pub fn queue_name(&self) -> String {
        format!("/queue_{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIdError {
    Empty,
    TooLong,
    InvalidChar,
}

impl fmt::Display for UserIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "user id must not be empty"),
            Self::TooLong => write!(f, "user id exceeds {USER_ID_MAX} bytes"),
            Self::InvalidChar => write!(f, "user id must not contain '/' or NUL"),
        }
    }
}

impl std::error::Error for UserIdError {}
