//! Client key handling.

use std::borrow::Borrow;

use crate::error::{Result, TurnstileError};

/// An opaque, non-empty identifier for the entity being rate limited.
///
/// The key is resolved by the caller (for example from a forwarded address
/// or an API credential). Two keys are equal only if their strings match
/// exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Create a new client key, rejecting the empty string.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(TurnstileError::InvalidKey);
        }
        Ok(Self(key))
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ClientKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
