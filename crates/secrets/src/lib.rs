//! Token resolution for configmanager
//!
//! Resolves secret/configuration tokens such as `AWSSECRETS:///app/db|password`
//! into plaintext values fetched concurrently from remote stores (AWS Secrets
//! Manager, AWS Parameter Store, Azure Key Vault, Azure Table Storage, Azure
//! App Configuration, GCP Secret Manager, HashiCorp Vault).
//!
//! This crate holds the store-agnostic core:
//!
//! - [`Token`] - the token grammar (prefix, store path, key path, metadata)
//! - [`SecretStore`] / [`StoreFactory`] - the contract every backend satisfies
//! - [`StoreRegistry`] - prefix to factory mapping
//! - [`Resolver`] - parallel fan-out retrieval with per-token error isolation
//! - [`descend`] - JSONPath-style lookup inside JSON secret values
//! - [`TokenScanner`] - token discovery and substitution inside arbitrary text
//!
//! Store implementations live in separate crates:
//! - configmanager-aws: `SecretsManagerFactory`, `ParameterStoreFactory`
//! - configmanager-azure: `KeyVaultFactory`, `TableStoreFactory`, `AppConfigFactory`
//! - configmanager-gcp: `GcpSecretsFactory`
//! - configmanager-vault: `VaultFactory`
//!
//! # Example
//!
//! ```ignore
//! use configmanager_secrets::{Config, Resolver, StoreRegistry};
//!
//! let resolver = Resolver::builder(registry).config(Config::default()).build()?;
//! let resolved = resolver.resolve(["AWSSECRETS://foo/bar"]).await?;
//! println!("{:?}", resolved.text("AWSSECRETS://foo/bar"));
//! ```

mod batch;
mod config;
mod keypath;
mod registry;
mod substitute;
mod token;
mod types;

pub use batch::{Resolver, ResolverBuilder};
pub use config::{Config, DEFAULT_KEY_SEPARATOR, DEFAULT_TOKEN_SEPARATOR, STDOUT_PATH};
pub use keypath::{descend, value_text};
pub use registry::StoreRegistry;
pub use substitute::TokenScanner;
pub use token::{ImplementationPrefix, Token, parse_metadata};
pub use types::{ResolvedTokens, SecureSecret};

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error types for token resolution
#[derive(Debug, Clone, Error)]
pub enum SecretError {
    /// No store implementation is registered for the prefix
    #[error("implementation not found for prefix '{prefix}'")]
    TokenInvalid {
        /// The prefix that was looked up
        prefix: String,
    },

    /// A store could not construct its backend client
    #[error("failed to initialise {store} client: {message}")]
    ClientInitialization {
        /// Store name (e.g. "aws-secrets-manager")
        store: &'static str,
        /// Underlying cause
        message: String,
    },

    /// Network or authentication failure while fetching
    #[error("failed to retrieve '{token}': {message}")]
    RetrieveFailed {
        /// Full token being fetched
        token: String,
        /// Underlying cause
        message: String,
    },

    /// Backend error the SDK did not classify further
    #[error("service call for '{token}' failed: {message}")]
    ServiceCallFailed {
        /// Full token being fetched
        token: String,
        /// Underlying cause
        message: String,
    },

    /// The token lacks the shape a store requires
    #[error("token '{token}' is incorrectly structured: {message}")]
    IncorrectlyStructuredToken {
        /// Full token
        token: String,
        /// What was expected
        message: String,
    },

    /// The batch was cancelled while this token was in flight
    #[error("retrieval of '{token}' was cancelled")]
    Cancelled {
        /// Full token
        token: String,
    },

    /// Engine configuration cannot be used (e.g. an empty separator)
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong
        message: String,
    },

    /// Every token in a non-empty batch failed
    #[error("none of the {} token(s) could be resolved", failures.len())]
    NothingResolved {
        /// Per-token failures
        failures: Vec<TokenFailure>,
    },
}

/// Coarse classification of [`SecretError`] for callers that only need to
/// match on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`SecretError::TokenInvalid`]
    TokenInvalid,
    /// See [`SecretError::ClientInitialization`]
    ClientInitialization,
    /// See [`SecretError::RetrieveFailed`]
    RetrieveFailed,
    /// See [`SecretError::ServiceCallFailed`]
    ServiceCallFailed,
    /// See [`SecretError::IncorrectlyStructuredToken`]
    IncorrectlyStructuredToken,
    /// See [`SecretError::Cancelled`]
    Cancelled,
    /// See [`SecretError::InvalidConfig`]
    InvalidConfig,
    /// See [`SecretError::NothingResolved`]
    NothingResolved,
}

impl SecretError {
    /// The kind of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TokenInvalid { .. } => ErrorKind::TokenInvalid,
            Self::ClientInitialization { .. } => ErrorKind::ClientInitialization,
            Self::RetrieveFailed { .. } => ErrorKind::RetrieveFailed,
            Self::ServiceCallFailed { .. } => ErrorKind::ServiceCallFailed,
            Self::IncorrectlyStructuredToken { .. } => ErrorKind::IncorrectlyStructuredToken,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::NothingResolved { .. } => ErrorKind::NothingResolved,
        }
    }

    /// Shorthand for a [`SecretError::RetrieveFailed`]
    #[must_use]
    pub fn retrieve_failed(token: &Token, cause: impl fmt::Display) -> Self {
        Self::RetrieveFailed {
            token: token.full_token().to_string(),
            message: cause.to_string(),
        }
    }

    /// Shorthand for a [`SecretError::IncorrectlyStructuredToken`]
    #[must_use]
    pub fn incorrectly_structured(token: &Token, message: impl Into<String>) -> Self {
        Self::IncorrectlyStructuredToken {
            token: token.full_token().to_string(),
            message: message.into(),
        }
    }
}

/// A single token that failed within a batch
#[derive(Debug, Clone)]
pub struct TokenFailure {
    /// The full token as supplied by the caller
    pub token: String,
    /// Why it failed
    pub error: SecretError,
}

impl fmt::Display for TokenFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.token, self.error)
    }
}

/// A backend adapter bound to a single token.
///
/// Instances are built by a [`StoreFactory`] once per pending fetch; they own
/// their backend client and release it on drop. Reuse across tokens is not
/// guaranteed.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Bind the token to fetch, re-parsing its metadata into the store's own
    /// shape.
    fn set_token(&mut self, token: Token);

    /// Fetch the value of the bound token.
    ///
    /// An empty successful response is not an error: the store returns an
    /// empty string and the engine records it as such.
    async fn fetch(&self) -> Result<String, SecretError>;
}

/// Builds a [`SecretStore`] for one token.
///
/// The cancellation handle is shared by every store of a batch; stores should
/// wrap their network calls with [`cancellable`] so an in-flight fetch returns
/// promptly when the batch is cancelled.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    /// Construct the store and its backend client.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::ClientInitialization`] if the backend client
    /// cannot be built.
    async fn build(
        &self,
        cancel: CancellationToken,
        token: &Token,
    ) -> Result<Box<dyn SecretStore>, SecretError>;
}

/// Run `fut` until it completes or `cancel` fires, whichever is first.
///
/// # Errors
///
/// Returns [`SecretError::Cancelled`] when cancellation wins, otherwise the
/// future's own result.
pub async fn cancellable<T, F>(
    cancel: &CancellationToken,
    token: &str,
    fut: F,
) -> Result<T, SecretError>
where
    F: Future<Output = Result<T, SecretError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SecretError::Cancelled {
            token: token.to_string(),
        }),
        result = fut => result,
    }
}
