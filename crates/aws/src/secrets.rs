//! AWS Secrets Manager store

use crate::{SharedConfig, sdk_error};
use async_trait::async_trait;
use aws_sdk_secretsmanager::Client;
use configmanager_secrets::{SecretError, SecretStore, StoreFactory, Token, cancellable};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const DEFAULT_VERSION_STAGE: &str = "AWSCURRENT";

/// Metadata recognised on `AWSSECRETS` tokens
///
/// `AWSSECRETS:///app/db[version=AWSPREVIOUS]`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretsManagerMetadata {
    /// Version stage label; `AWSCURRENT` when empty
    #[serde(default)]
    pub version: String,
}

impl SecretsManagerMetadata {
    /// The stage to request
    #[must_use]
    pub fn version_stage(&self) -> &str {
        if self.version.is_empty() {
            DEFAULT_VERSION_STAGE
        } else {
            &self.version
        }
    }
}

/// Builds [`SecretsManagerStore`]s sharing one SDK configuration
#[derive(Debug, Default)]
pub struct SecretsManagerFactory {
    config: SharedConfig,
}

impl SecretsManagerFactory {
    /// Create a factory; configuration is loaded on first use
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreFactory for SecretsManagerFactory {
    async fn build(
        &self,
        cancel: CancellationToken,
        _token: &Token,
    ) -> Result<Box<dyn SecretStore>, SecretError> {
        let client = Client::new(self.config.get().await);
        Ok(Box::new(SecretsManagerStore::new(client, cancel)))
    }
}

/// Fetches one secret from AWS Secrets Manager
pub struct SecretsManagerStore {
    client: Client,
    cancel: CancellationToken,
    token: Option<Token>,
    metadata: SecretsManagerMetadata,
}

impl std::fmt::Debug for SecretsManagerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsManagerStore")
            .field("token", &self.token.as_ref().map(Token::full_token))
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl SecretsManagerStore {
    /// Wrap an SDK client
    #[must_use]
    pub fn new(client: Client, cancel: CancellationToken) -> Self {
        Self {
            client,
            cancel,
            token: None,
            metadata: SecretsManagerMetadata::default(),
        }
    }
}

#[async_trait]
impl SecretStore for SecretsManagerStore {
    fn set_token(&mut self, token: Token) {
        self.metadata = token.metadata();
        self.token = Some(token);
    }

    async fn fetch(&self) -> Result<String, SecretError> {
        let token = self.token.as_ref().ok_or_else(|| SecretError::InvalidConfig {
            message: "secrets manager store used before a token was set".to_string(),
        })?;

        tracing::debug!(
            secret_id = token.store_token(),
            version_stage = self.metadata.version_stage(),
            "requesting secret value"
        );
        let request = self
            .client
            .get_secret_value()
            .secret_id(token.store_token())
            .version_stage(self.metadata.version_stage())
            .send();

        let output = cancellable(&self.cancel, token.full_token(), async {
            request.await.map_err(|e| sdk_error(token, &e))
        })
        .await?;

        if let Some(secret) = output.secret_string() {
            return Ok(secret.to_string());
        }
        Ok(output
            .secret_binary()
            .map(|blob| String::from_utf8_lossy(blob.as_ref()).into_owned())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configmanager_secrets::Config;

    fn token(raw: &str) -> Token {
        Token::parse(raw, &Config::default()).unwrap()
    }

    #[test]
    fn test_default_stage() {
        let metadata: SecretsManagerMetadata = token("AWSSECRETS:///app/db").metadata();
        assert_eq!(metadata.version_stage(), "AWSCURRENT");
    }

    #[test]
    fn test_stage_from_metadata() {
        let metadata: SecretsManagerMetadata =
            token("AWSSECRETS:///app/db[version=AWSPREVIOUS]|password").metadata();
        assert_eq!(metadata.version_stage(), "AWSPREVIOUS");
    }

    #[test]
    fn test_unknown_metadata_keys_ignored() {
        let metadata: SecretsManagerMetadata =
            token("AWSSECRETS:///app/db[label=dev,version=v3]").metadata();
        assert_eq!(metadata.version, "v3");
    }

    #[tokio::test]
    async fn test_fetch_without_token_fails() {
        let config = aws_sdk_secretsmanager::Config::builder()
            .behavior_version(aws_sdk_secretsmanager::config::BehaviorVersion::latest())
            .region(aws_sdk_secretsmanager::config::Region::new("eu-west-1"))
            .build();
        let store =
            SecretsManagerStore::new(Client::from_conf(config), CancellationToken::new());
        assert!(store.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_honours_cancellation() {
        let config = aws_sdk_secretsmanager::Config::builder()
            .behavior_version(aws_sdk_secretsmanager::config::BehaviorVersion::latest())
            .region(aws_sdk_secretsmanager::config::Region::new("eu-west-1"))
            .endpoint_url("http://127.0.0.1:9")
            .build();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut store = SecretsManagerStore::new(Client::from_conf(config), cancel);
        store.set_token(token("AWSSECRETS:///app/db"));
        let err = store.fetch().await.unwrap_err();
        assert!(matches!(err, SecretError::Cancelled { .. }));
    }
}
