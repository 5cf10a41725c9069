//! The configmanager façade
//!
//! Wraps a [`Resolver`] with the four entry points applications use: resolve
//! a token list, substitute tokens in text, and round-trip a record through
//! JSON or YAML with its tokens replaced.

use crate::error::Result;
use crate::stores::default_registry;
use configmanager_secrets::{Config, ResolvedTokens, Resolver, StoreRegistry};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// Encoding of the bytes handed to [`ConfigManager::unmarshal_from`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// JSON document
    Json,
    /// YAML document
    Yaml,
}

/// Resolves tokens against the configured stores
#[derive(Debug, Clone)]
pub struct ConfigManager {
    resolver: Resolver,
}

impl From<Resolver> for ConfigManager {
    fn from(resolver: Resolver) -> Self {
        Self { resolver }
    }
}

impl ConfigManager {
    /// Façade over every built-in store.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` has unusable separators.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_registry(default_registry(), config)
    }

    /// Façade over a caller-supplied registry.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` has unusable separators.
    pub fn with_registry(registry: StoreRegistry, config: Config) -> Result<Self> {
        let resolver = Resolver::builder(registry).config(config).build()?;
        Ok(Self { resolver })
    }

    /// The underlying resolver
    #[must_use]
    pub const fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Handle that cancels every in-flight fetch of this façade
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.resolver.cancellation_token()
    }

    /// Resolve a list of tokens into a result map keyed by full token.
    ///
    /// # Errors
    ///
    /// Returns an error when tokens were supplied and none resolved.
    pub async fn retrieve<I, S>(&self, tokens: I) -> Result<ResolvedTokens>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(self.resolver.resolve(tokens).await?)
    }

    /// Replace every resolvable token in `text`.
    ///
    /// # Errors
    ///
    /// Returns an error when tokens were found and none resolved.
    pub async fn retrieve_replaced(&self, text: &str) -> Result<String> {
        Ok(self.resolver.resolve_text(text).await?)
    }

    /// Replace the tokens inside `record` by serialising it to JSON,
    /// substituting, and deserialising the result back into it.
    ///
    /// # Errors
    ///
    /// JSON errors surface as-is; resolution errors as in
    /// [`retrieve_replaced`](Self::retrieve_replaced). `record` is untouched
    /// on error.
    pub async fn marshalled_into<T>(&self, record: &mut T) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        let encoded = serde_json::to_string(record)?;
        let replaced = self.retrieve_replaced(&encoded).await?;
        *record = serde_json::from_str(&replaced)?;
        Ok(())
    }

    /// Substitute tokens in `input`, then decode it as `format`.
    ///
    /// # Errors
    ///
    /// Returns an error if `input` is not UTF-8, if resolution fails, or if
    /// the replaced document does not decode into `T`.
    pub async fn unmarshal_from<T>(&self, input: &[u8], format: InputFormat) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let text = std::str::from_utf8(input)?;
        let replaced = self.retrieve_replaced(text).await?;
        let record = match format {
            InputFormat::Json => serde_json::from_str(&replaced)?,
            InputFormat::Yaml => serde_yaml::from_str(&replaced)?,
        };
        Ok(record)
    }
}
