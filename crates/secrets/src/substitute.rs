//! Token discovery and substitution in arbitrary text

use crate::{Config, ImplementationPrefix, SecretError, value_text};
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Finds tokens of any known prefix inside text.
///
/// The pattern is compiled once from the configured separators:
/// `(P1|P2|...)<tokenSep>[A-Za-z0-9_/\-]+(\[[^\]]*\])?(<keySep>[^\s"',]+)?`
#[derive(Debug, Clone)]
pub struct TokenScanner {
    pattern: Regex,
}

impl TokenScanner {
    /// Compile the scanner for `config`'s separators.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::InvalidConfig`] if the separators are unusable.
    pub fn new(config: &Config) -> Result<Self, SecretError> {
        config.validate()?;

        let prefixes = ImplementationPrefix::ALL
            .iter()
            .map(|prefix| regex::escape(prefix.as_str()))
            .collect::<Vec<_>>()
            .join("|");
        let expr = format!(
            r#"({prefixes}){token_sep}[A-Za-z0-9_/\-]+(\[[^\]]*\])?({key_sep}[^\s"',]+)?"#,
            token_sep = regex::escape(config.token_separator()),
            key_sep = regex::escape(config.key_separator()),
        );

        let pattern = Regex::new(&expr).map_err(|e| SecretError::InvalidConfig {
            message: format!("token pattern does not compile: {e}"),
        })?;
        Ok(Self { pattern })
    }

    /// Unique tokens in order of first appearance
    #[must_use]
    pub fn find_tokens<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut seen = HashSet::new();
        self.pattern
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|token| seen.insert(*token))
            .collect()
    }

    /// Replace every discovered token that has a resolved value.
    ///
    /// Runs as a single pass over `text`: inserted values are never
    /// rescanned, and bytes outside resolved tokens are copied verbatim.
    #[must_use]
    pub fn replace(&self, text: &str, resolved: &HashMap<String, Value>) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for found in self.pattern.find_iter(text) {
            if let Some(value) = resolved.get(found.as_str()) {
                out.push_str(&text[last..found.start()]);
                out.push_str(&value_text(value));
                last = found.end();
            }
        }
        out.push_str(&text[last..]);
        out
    }
}
