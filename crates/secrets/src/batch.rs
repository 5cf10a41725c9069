//! Parallel token resolution
//!
//! One worker task per unique token:
//! - workers look up their factory, build a store, bind the token and fetch
//! - results come back over a bounded channel sized to the worker count
//! - the draining task applies key-path descent and assembles the result map
//! - a failed token is left out of the map; the batch only errors when
//!   nothing at all resolved

use crate::{
    Config, ResolvedTokens, SecretError, SecureSecret, StoreRegistry, Token, TokenFailure,
    TokenScanner, cancellable, descend,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// Resolves batches of tokens against a [`StoreRegistry`].
///
/// # Example
///
/// ```ignore
/// use configmanager_secrets::{Config, Resolver};
///
/// let resolver = Resolver::builder(registry)
///     .config(Config::default())
///     .span(tracing::info_span!("deploy"))
///     .build()?;
///
/// let resolved = resolver.resolve(["AWSSECRETS://foo/bar"]).await?;
/// let text = resolver.resolve_text("pwd='AWSSECRETS://foo/bar'").await?;
/// ```
#[derive(Debug, Clone)]
pub struct Resolver {
    config: Config,
    registry: Arc<StoreRegistry>,
    scanner: TokenScanner,
    cancel: CancellationToken,
    span: Span,
}

/// Builder for [`Resolver`]
#[derive(Debug)]
pub struct ResolverBuilder {
    registry: StoreRegistry,
    config: Config,
    cancel: Option<CancellationToken>,
    span: Option<Span>,
}

impl ResolverBuilder {
    /// Use `config` instead of the default configuration
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Share an existing cancellation handle instead of creating one
    #[must_use]
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Parent span for every worker's log output
    #[must_use]
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Finish building.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::InvalidConfig`] if the separators are unusable.
    pub fn build(self) -> Result<Resolver, SecretError> {
        let scanner = TokenScanner::new(&self.config)?;
        Ok(Resolver {
            config: self.config,
            registry: Arc::new(self.registry),
            scanner,
            cancel: self.cancel.unwrap_or_default(),
            span: self.span.unwrap_or_else(Span::none),
        })
    }
}

impl Resolver {
    /// Start building a resolver that owns a copy of `registry`
    #[must_use]
    pub fn builder(registry: StoreRegistry) -> ResolverBuilder {
        ResolverBuilder {
            registry,
            config: Config::default(),
            cancel: None,
            span: None,
        }
    }

    /// Resolver with default configuration.
    ///
    /// # Errors
    ///
    /// Never fails for the default configuration; see [`ResolverBuilder::build`].
    pub fn new(registry: StoreRegistry) -> Result<Self, SecretError> {
        Self::builder(registry).build()
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The scanner compiled for this configuration
    #[must_use]
    pub fn scanner(&self) -> &TokenScanner {
        &self.scanner
    }

    /// Handle that cancels every in-flight fetch of this resolver
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolve a list of candidate tokens.
    ///
    /// Strings that do not parse as tokens are skipped. Textually identical
    /// tokens are fetched once.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::NothingResolved`] when at least one token was
    /// attempted and none succeeded. Partial failures are reported through
    /// [`ResolvedTokens::failures`] instead.
    pub async fn resolve<I, S>(&self, tokens: I) -> Result<ResolvedTokens, SecretError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeMap<String, Token> = tokens
            .into_iter()
            .filter_map(|raw| Token::parse(raw.as_ref(), &self.config))
            .map(|token| (token.full_token().to_string(), token))
            .collect();

        if unique.is_empty() {
            return Ok(ResolvedTokens::new());
        }

        let worker_count = unique.len();
        tracing::debug!(parent: &self.span, tokens = worker_count, "resolving token batch");

        let (tx, mut rx) = mpsc::channel(worker_count);
        let mut workers = JoinSet::new();
        for token in unique.into_values() {
            let tx = tx.clone();
            let registry = Arc::clone(&self.registry);
            let cancel = self.cancel.clone();
            let span = tracing::info_span!(
                parent: &self.span,
                "fetch",
                token = %token.full_token(),
                prefix = %token.prefix(),
            );
            workers.spawn(
                async move {
                    let result = fetch_token(&registry, cancel, &token).await;
                    if tx.send((token, result)).await.is_err() {
                        tracing::debug!("result receiver dropped before send");
                    }
                }
                .instrument(span),
            );
        }
        // The channel closes once every worker has dropped its sender.
        drop(tx);

        let mut resolved = ResolvedTokens::with_capacity(worker_count);
        while let Some((token, result)) = rx.recv().await {
            match result {
                Ok(secret) => {
                    let value = descend(secret.expose(), token.key_path());
                    resolved.insert(token.full_token().to_string(), value);
                }
                Err(error) => {
                    tracing::warn!(
                        parent: &self.span,
                        token = %token.full_token(),
                        error = %error,
                        "failed to resolve token"
                    );
                    resolved.push_failure(TokenFailure {
                        token: token.full_token().to_string(),
                        error,
                    });
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(parent: &self.span, error = %e, "token worker aborted");
            }
        }

        if resolved.is_empty() {
            return Err(SecretError::NothingResolved {
                failures: resolved.failures().to_vec(),
            });
        }
        Ok(resolved)
    }

    /// Replace every token found in `text` with its resolved value.
    ///
    /// Text with no tokens is returned unchanged without touching any store.
    /// Tokens that failed to resolve are left in place.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::NothingResolved`] when tokens were found and
    /// none of them resolved.
    pub async fn resolve_text(&self, text: &str) -> Result<String, SecretError> {
        let found = self.scanner.find_tokens(text);
        if found.is_empty() {
            return Ok(text.to_string());
        }
        let resolved = self.resolve(found).await?;
        Ok(self.scanner.replace(text, resolved.values()))
    }
}

async fn fetch_token(
    registry: &StoreRegistry,
    cancel: CancellationToken,
    token: &Token,
) -> Result<SecureSecret, SecretError> {
    let factory = registry.factory(token.prefix())?;
    let mut store = cancellable(
        &cancel,
        token.full_token(),
        factory.build(cancel.clone(), token),
    )
    .await?;
    store.set_token(token.clone());

    let value = cancellable(&cancel, token.full_token(), store.fetch()).await?;
    if value.is_empty() {
        tracing::error!("EmptyResponse: store returned an empty value");
    }
    Ok(SecureSecret::new(value))
}
