//! Engine configuration

use crate::SecretError;
use serde::{Deserialize, Serialize};

/// Default separator between a prefix and the store path
pub const DEFAULT_TOKEN_SEPARATOR: &str = "://";
/// Default separator between the store path and the key path
pub const DEFAULT_KEY_SEPARATOR: &str = "|";
/// Output path meaning "write to standard output"
pub const STDOUT_PATH: &str = "stdout";

/// Configuration shared by parsing, resolution and substitution.
///
/// Immutable once handed to a [`Resolver`](crate::Resolver). Separators are
/// literal strings, never patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    output_path: String,
    token_separator: String,
    key_separator: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_path: STDOUT_PATH.to_string(),
            token_separator: DEFAULT_TOKEN_SEPARATOR.to_string(),
            key_separator: DEFAULT_KEY_SEPARATOR.to_string(),
        }
    }
}

impl Config {
    /// Create a config with default separators writing to stdout
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output destination hint
    #[must_use]
    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = path.into();
        self
    }

    /// Set the prefix/store-path separator
    #[must_use]
    pub fn with_token_separator(mut self, separator: impl Into<String>) -> Self {
        self.token_separator = separator.into();
        self
    }

    /// Set the store-path/key-path separator
    #[must_use]
    pub fn with_key_separator(mut self, separator: impl Into<String>) -> Self {
        self.key_separator = separator.into();
        self
    }

    /// Destination hint for export-style output (`stdout` or a file path)
    #[must_use]
    pub fn output_path(&self) -> &str {
        &self.output_path
    }

    /// Separator between prefix and store path
    #[must_use]
    pub fn token_separator(&self) -> &str {
        &self.token_separator
    }

    /// Separator between store path and key path
    #[must_use]
    pub fn key_separator(&self) -> &str {
        &self.key_separator
    }

    /// Check that both separators are usable.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::InvalidConfig`] if a separator is empty or both
    /// separators are the same string.
    pub fn validate(&self) -> Result<(), SecretError> {
        if self.token_separator.is_empty() {
            return Err(SecretError::InvalidConfig {
                message: "token separator must not be empty".to_string(),
            });
        }
        if self.key_separator.is_empty() {
            return Err(SecretError::InvalidConfig {
                message: "key separator must not be empty".to_string(),
            });
        }
        if self.token_separator == self.key_separator {
            return Err(SecretError::InvalidConfig {
                message: format!(
                    "token and key separators must differ (both are '{}')",
                    self.key_separator
                ),
            });
        }
        Ok(())
    }
}
