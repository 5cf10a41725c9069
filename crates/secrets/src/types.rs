//! Resolution result types
//!
//! - [`SecureSecret`]: a fetched value that zeroes on drop and never prints
//! - [`ResolvedTokens`]: the result map of one batch plus its partial failures

use crate::{TokenFailure, value_text};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::collections::HashMap;

/// A fetched value with automatic memory zeroing on drop.
///
/// Debug and Display output show `[REDACTED]`; `.expose()` is required to
/// read the value.
#[derive(Clone)]
pub struct SecureSecret {
    inner: SecretString,
}

impl SecureSecret {
    /// Move a value into secure storage
    #[must_use]
    pub fn new(value: String) -> Self {
        Self {
            inner: SecretString::from(value),
        }
    }

    /// Expose the secret value for use
    #[must_use]
    pub fn expose(&self) -> &str {
        self.inner.expose_secret()
    }

    /// Length of the value without exposing it
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// Check if the value is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for SecureSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl std::fmt::Display for SecureSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Result of resolving one batch.
///
/// Values are keyed by the full token exactly as supplied. A value is a JSON
/// string unless key-path descent picked a non-string subtree. Tokens that
/// failed are absent from the map and listed in [`failures`](Self::failures).
#[derive(Default, Clone)]
pub struct ResolvedTokens {
    values: HashMap<String, Value>,
    failures: Vec<TokenFailure>,
}

impl ResolvedTokens {
    /// Create an empty result
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a result with pre-allocated capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: HashMap::with_capacity(capacity),
            failures: Vec::new(),
        }
    }

    /// Record a resolved value
    pub fn insert(&mut self, full_token: String, value: Value) {
        self.values.insert(full_token, value);
    }

    /// Record a failed token
    pub fn push_failure(&mut self, failure: TokenFailure) {
        self.failures.push(failure);
    }

    /// Resolved value for a token
    #[must_use]
    pub fn get(&self, full_token: &str) -> Option<&Value> {
        self.values.get(full_token)
    }

    /// Resolved value for a token rendered as text
    #[must_use]
    pub fn text(&self, full_token: &str) -> Option<String> {
        self.values.get(full_token).map(value_text)
    }

    /// Check if a token was resolved
    #[must_use]
    pub fn contains(&self, full_token: &str) -> bool {
        self.values.contains_key(full_token)
    }

    /// Number of resolved tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if nothing was resolved
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(full_token, value)` pairs in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// The value map
    #[must_use]
    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    /// Tokens that failed in a partially successful batch
    #[must_use]
    pub fn failures(&self) -> &[TokenFailure] {
        &self.failures
    }

    /// Consume into the value map, dropping failure details
    #[must_use]
    pub fn into_values(self) -> HashMap<String, Value> {
        self.values
    }
}

impl std::fmt::Debug for ResolvedTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTokens")
            .field("count", &self.values.len())
            .field("tokens", &self.values.keys().collect::<Vec<_>>())
            .field("failures", &self.failures.len())
            .finish()
    }
}
