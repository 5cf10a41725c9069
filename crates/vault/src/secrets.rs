//! `HashiCorp` Vault KV v2 store
//!
//! `VAULT://secret___app/db[version=2]|password` reads version 2 of `app/db`
//! on the `secret` mount. The whole data map is returned as a JSON object, so a
//! key path usually picks the field.

use crate::iam;
use async_trait::async_trait;
use configmanager_secrets::{SecretError, SecretStore, StoreFactory, Token, cancellable};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};

const STORE: &str = "hashicorp-vault";
const MOUNT_SEPARATOR: &str = "___";
const IAM_TOKEN_PREFIX: &str = "aws_iam";

/// Metadata recognised on `VAULT` tokens
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultMetadata {
    /// KV v2 version number; latest when empty
    #[serde(default)]
    pub version: String,
    /// Vault role for AWS IAM login
    #[serde(default)]
    pub iam_role: String,
}

/// Split a store token into `(mount, path)` at the first `___`.
///
/// Leading slashes on both parts are dropped.
///
/// # Errors
///
/// Returns [`SecretError::IncorrectlyStructuredToken`] when the separator is
/// missing or either side is empty.
pub fn mount_and_path(token: &Token) -> Result<(&str, &str), SecretError> {
    let trimmed = token.store_token().trim_start_matches('/');
    match trimmed.split_once(MOUNT_SEPARATOR) {
        Some((mount, path)) if !mount.is_empty() && !path.trim_start_matches('/').is_empty() => {
            Ok((mount, path.trim_start_matches('/')))
        }
        _ => Err(SecretError::incorrectly_structured(
            token,
            "expected <mount>___<path>",
        )),
    }
}

/// Server address and credential hint
#[derive(Clone, Default)]
pub struct VaultSettings {
    /// Server URL, e.g. `https://vault.internal:8200`
    pub address: Option<String>,
    /// Client token, or a value starting with `aws_iam` to log in through IAM
    pub token: Option<SecretString>,
}

impl std::fmt::Debug for VaultSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSettings")
            .field("address", &self.address)
            .field("iam", &self.uses_iam())
            .finish_non_exhaustive()
    }
}

impl VaultSettings {
    /// Read `VAULT_ADDR` and `VAULT_TOKEN`
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            address: std::env::var("VAULT_ADDR").ok().filter(|v| !v.is_empty()),
            token: std::env::var("VAULT_TOKEN")
                .ok()
                .filter(|v| !v.is_empty())
                .map(SecretString::from),
        }
    }

    /// Whether the token asks for AWS IAM login
    #[must_use]
    pub fn uses_iam(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(|t| t.expose_secret().starts_with(IAM_TOKEN_PREFIX))
    }
}

/// Builds [`VaultStore`]s
#[derive(Debug, Clone)]
pub struct VaultFactory {
    settings: VaultSettings,
}

impl Default for VaultFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl VaultFactory {
    /// Factory configured from the environment
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(VaultSettings::from_env())
    }

    /// Factory with explicit settings
    #[must_use]
    pub const fn with_settings(settings: VaultSettings) -> Self {
        Self { settings }
    }

    fn client(&self, token: Option<&str>) -> Result<VaultClient, SecretError> {
        let init_error = |message: String| SecretError::ClientInitialization {
            store: STORE,
            message,
        };

        let address = self
            .settings
            .address
            .as_deref()
            .ok_or_else(|| init_error("VAULT_ADDR is not set".to_string()))?;

        let mut builder = VaultClientSettingsBuilder::default();
        builder.address(address);
        if let Some(token) = token {
            builder.token(token);
        }
        let settings = builder
            .build()
            .map_err(|e| init_error(format!("invalid client settings: {e}")))?;
        VaultClient::new(settings).map_err(|e| init_error(format!("failed to create client: {e}")))
    }
}

#[async_trait]
impl StoreFactory for VaultFactory {
    async fn build(
        &self,
        cancel: CancellationToken,
        token: &Token,
    ) -> Result<Box<dyn SecretStore>, SecretError> {
        let client = if self.settings.uses_iam() {
            let metadata: VaultMetadata = token.metadata();
            if metadata.iam_role.is_empty() {
                return Err(SecretError::ClientInitialization {
                    store: STORE,
                    message: "iam_role metadata is required for AWS IAM login; EC2 auth not supported"
                        .to_string(),
                });
            }
            let mut client = self.client(None)?;
            cancellable(&cancel, token.full_token(), async {
                iam::login(&mut client, &metadata.iam_role)
                    .await
                    .map_err(|message| SecretError::ClientInitialization {
                        store: STORE,
                        message,
                    })
            })
            .await?;
            client
        } else {
            self.client(self.settings.token.as_ref().map(ExposeSecret::expose_secret))?
        };

        Ok(Box::new(VaultStore {
            client,
            cancel,
            token: None,
            metadata: VaultMetadata::default(),
        }))
    }
}

/// Reads one KV v2 secret
pub struct VaultStore {
    client: VaultClient,
    cancel: CancellationToken,
    token: Option<Token>,
    metadata: VaultMetadata,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("token", &self.token.as_ref().map(Token::full_token))
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl VaultStore {
    async fn read(&self, token: &Token) -> Result<String, SecretError> {
        let (mount, path) = mount_and_path(token)?;

        let data: Map<String, Value> = if self.metadata.version.is_empty() {
            tracing::debug!(mount, path, "reading latest secret version");
            vaultrs::kv2::read(&self.client, mount, path).await
        } else {
            let version: u64 = self.metadata.version.parse().map_err(|e| {
                SecretError::incorrectly_structured(
                    token,
                    format!("version '{}' is not a number: {e}", self.metadata.version),
                )
            })?;
            tracing::debug!(mount, path, version, "reading secret version");
            vaultrs::kv2::read_version(&self.client, mount, path, version).await
        }
        .map_err(|e| SecretError::retrieve_failed(token, e))?;

        serde_json::to_string(&data).map_err(|e| SecretError::ServiceCallFailed {
            token: token.full_token().to_string(),
            message: format!("secret data is not serialisable: {e}"),
        })
    }
}

#[async_trait]
impl SecretStore for VaultStore {
    fn set_token(&mut self, token: Token) {
        self.metadata = token.metadata();
        self.token = Some(token);
    }

    async fn fetch(&self) -> Result<String, SecretError> {
        let token = self.token.as_ref().ok_or_else(|| SecretError::InvalidConfig {
            message: "vault store used before a token was set".to_string(),
        })?;
        cancellable(&self.cancel, token.full_token(), self.read(token)).await
    }
}
