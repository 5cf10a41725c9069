//! AWS SSM Parameter Store store

use crate::{SharedConfig, sdk_error};
use async_trait::async_trait;
use aws_sdk_ssm::Client;
use configmanager_secrets::{SecretError, SecretStore, StoreFactory, Token, cancellable};
use tokio_util::sync::CancellationToken;

/// Builds [`ParameterStore`]s sharing one SDK configuration
#[derive(Debug, Default)]
pub struct ParameterStoreFactory {
    config: SharedConfig,
}

impl ParameterStoreFactory {
    /// Create a factory; configuration is loaded on first use
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreFactory for ParameterStoreFactory {
    async fn build(
        &self,
        cancel: CancellationToken,
        _token: &Token,
    ) -> Result<Box<dyn SecretStore>, SecretError> {
        let client = Client::new(self.config.get().await);
        Ok(Box::new(ParameterStore::new(client, cancel)))
    }
}

/// Fetches one decrypted parameter. The store token is the parameter name.
pub struct ParameterStore {
    client: Client,
    cancel: CancellationToken,
    token: Option<Token>,
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStore")
            .field("token", &self.token.as_ref().map(Token::full_token))
            .finish_non_exhaustive()
    }
}

impl ParameterStore {
    /// Wrap an SDK client
    #[must_use]
    pub fn new(client: Client, cancel: CancellationToken) -> Self {
        Self {
            client,
            cancel,
            token: None,
        }
    }
}

#[async_trait]
impl SecretStore for ParameterStore {
    fn set_token(&mut self, token: Token) {
        self.token = Some(token);
    }

    async fn fetch(&self) -> Result<String, SecretError> {
        let token = self.token.as_ref().ok_or_else(|| SecretError::InvalidConfig {
            message: "parameter store used before a token was set".to_string(),
        })?;

        tracing::debug!(name = token.store_token(), "requesting parameter");
        let request = self
            .client
            .get_parameter()
            .name(token.store_token())
            .with_decryption(true)
            .send();

        let output = cancellable(&self.cancel, token.full_token(), async {
            request.await.map_err(|e| sdk_error(token, &e))
        })
        .await?;

        Ok(output
            .parameter()
            .and_then(|p| p.value())
            .unwrap_or_default()
            .to_string())
    }
}
