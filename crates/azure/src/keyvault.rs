//! Azure Key Vault store
//!
//! `AZKVSECRET:///myvault/db-password[version=0a1b...]` reads secret
//! `db-password` from `https://myvault.vault.azure.net` through the Key Vault
//! secrets SDK client.

use crate::{AzureAuth, service_key, service_url};
use async_trait::async_trait;
use azure_security_keyvault_secrets::SecretClient;
use configmanager_secrets::{SecretError, SecretStore, StoreFactory, Token, cancellable};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const STORE: &str = "azure-key-vault";
const URL_TEMPLATE: &str = "https://{}.vault.azure.net";

/// Metadata recognised on `AZKVSECRET` tokens
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyVaultMetadata {
    /// Secret version; latest when empty
    #[serde(default)]
    pub version: String,
}

/// Builds [`KeyVaultStore`]s
#[derive(Debug, Clone)]
pub struct KeyVaultFactory {
    auth: Arc<AzureAuth>,
    endpoint: Option<Url>,
}

impl KeyVaultFactory {
    /// Factory authenticating through `auth`
    #[must_use]
    pub fn new(auth: Arc<AzureAuth>) -> Self {
        Self {
            auth,
            endpoint: None,
        }
    }

    /// Send every request to `endpoint` instead of the vault's public URL
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }
}

#[async_trait]
impl StoreFactory for KeyVaultFactory {
    async fn build(
        &self,
        cancel: CancellationToken,
        token: &Token,
    ) -> Result<Box<dyn SecretStore>, SecretError> {
        let (vault, _) = service_key(token.store_token());
        let base = service_url(STORE, self.endpoint.as_ref(), URL_TEMPLATE, vault)?;
        let init_error = |e: azure_core::Error| SecretError::ClientInitialization {
            store: STORE,
            message: e.to_string(),
        };

        let credential = self.auth.credential().await.map_err(init_error)?;
        let client = SecretClient::new(base.as_str(), credential, None).map_err(init_error)?;
        tracing::debug!(vault = %base, "created Key Vault client");

        Ok(Box::new(KeyVaultStore {
            client,
            cancel,
            token: None,
            metadata: KeyVaultMetadata::default(),
        }))
    }
}

/// Fetches one Key Vault secret
pub struct KeyVaultStore {
    client: SecretClient,
    cancel: CancellationToken,
    token: Option<Token>,
    metadata: KeyVaultMetadata,
}

impl std::fmt::Debug for KeyVaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVaultStore")
            .field("token", &self.token)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl KeyVaultStore {
    async fn get(&self, token: &Token) -> Result<String, SecretError> {
        let (_, key) = service_key(token.store_token());
        let name = key.trim_start_matches('/');
        if name.is_empty() {
            return Err(SecretError::incorrectly_structured(
                token,
                "expected <vault>/<secret-name>",
            ));
        }

        tracing::debug!(secret = name, version = %self.metadata.version, "requesting Key Vault secret");
        let secret = self
            .client
            .get_secret(name, &self.metadata.version, None)
            .await
            .map_err(|e| SecretError::retrieve_failed(token, e))?
            .into_body()
            .await
            .map_err(|e| SecretError::retrieve_failed(token, e))?;
        Ok(secret.value.unwrap_or_default())
    }
}

#[async_trait]
impl SecretStore for KeyVaultStore {
    fn set_token(&mut self, token: Token) {
        self.metadata = token.metadata();
        self.token = Some(token);
    }

    async fn fetch(&self) -> Result<String, SecretError> {
        let token = self.token.as_ref().ok_or_else(|| SecretError::InvalidConfig {
            message: "key vault store used before a token was set".to_string(),
        })?;
        cancellable(&self.cancel, token.full_token(), self.get(token)).await
    }
}
