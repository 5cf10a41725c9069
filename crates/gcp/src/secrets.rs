//! GCP Secret Manager store with auto-negotiating dual mode (HTTP + CLI)

use async_trait::async_trait;
use configmanager_secrets::{SecretError, SecretStore, StoreFactory, Token, cancellable};
use google_secretmanager1::{SecretManager, hyper_rustls, hyper_util};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const STORE: &str = "gcp-secret-manager";
const DEFAULT_VERSION: &str = "latest";

type Hub = SecretManager<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Metadata recognised on `GCPSECRETS` tokens
///
/// `GCPSECRETS:///projects/p/secrets/db[version=3]`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GcpSecretMetadata {
    /// Secret version; `latest` when empty
    #[serde(default)]
    pub version: String,
}

/// Full version resource name for a store token, e.g.
/// `projects/p/secrets/db/versions/latest`
#[must_use]
pub fn resource_name(store_token: &str, metadata: &GcpSecretMetadata) -> String {
    let version = if metadata.version.is_empty() {
        DEFAULT_VERSION
    } else {
        &metadata.version
    };
    format!(
        "{}/versions/{version}",
        store_token.trim_start_matches('/').trim_end_matches('/')
    )
}

/// How the factory reaches Secret Manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcpMode {
    /// REST API authenticated with a service account key file
    ServiceAccount(PathBuf),
    /// `gcloud secrets versions access`
    Cli,
}

impl GcpMode {
    /// `GOOGLE_APPLICATION_CREDENTIALS` set: HTTP mode, otherwise CLI mode
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS")
            .filter(|path| !path.is_empty())
            .map_or(Self::Cli, |path| Self::ServiceAccount(PathBuf::from(path)))
    }
}

/// Builds [`GcpSecretsStore`]s
#[derive(Debug, Clone)]
pub struct GcpSecretsFactory {
    mode: GcpMode,
}

impl Default for GcpSecretsFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl GcpSecretsFactory {
    /// Factory with the mode detected from the environment
    #[must_use]
    pub fn new() -> Self {
        Self::with_mode(GcpMode::from_env())
    }

    /// Factory with an explicit mode
    #[must_use]
    pub const fn with_mode(mode: GcpMode) -> Self {
        Self { mode }
    }

    /// The negotiated mode
    #[must_use]
    pub const fn mode(&self) -> &GcpMode {
        &self.mode
    }

    async fn hub(key_path: &Path) -> Result<Hub, SecretError> {
        let init_error = |message: String| SecretError::ClientInitialization {
            store: STORE,
            message,
        };

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| init_error(format!("failed to load native TLS roots: {e}")))?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
            .build(connector);

        let key = yup_oauth2::read_service_account_key(key_path)
            .await
            .map_err(|e| {
                init_error(format!(
                    "failed to read service account key {}: {e}",
                    key_path.display()
                ))
            })?;
        let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| init_error(format!("failed to build authenticator: {e}")))?;

        Ok(SecretManager::new(client, auth))
    }
}

#[async_trait]
impl StoreFactory for GcpSecretsFactory {
    async fn build(
        &self,
        cancel: CancellationToken,
        _token: &Token,
    ) -> Result<Box<dyn SecretStore>, SecretError> {
        let hub = match &self.mode {
            GcpMode::ServiceAccount(key_path) => Some(Self::hub(key_path).await?),
            GcpMode::Cli => None,
        };
        Ok(Box::new(GcpSecretsStore {
            hub: Mutex::new(hub),
            cancel,
            token: None,
            metadata: GcpSecretMetadata::default(),
        }))
    }
}

/// Fetches one secret version.
///
/// In HTTP mode the client is released once the fetch completes.
pub struct GcpSecretsStore {
    hub: Mutex<Option<Hub>>,
    cancel: CancellationToken,
    token: Option<Token>,
    metadata: GcpSecretMetadata,
}

impl std::fmt::Debug for GcpSecretsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpSecretsStore")
            .field("token", &self.token.as_ref().map(Token::full_token))
            .field("metadata", &self.metadata)
            .field("hub", &"[SecretManager]")
            .finish_non_exhaustive()
    }
}

impl GcpSecretsStore {
    async fn access_http(hub: Hub, token: &Token, resource: &str) -> Result<String, SecretError> {
        let (_, response) = hub
            .projects()
            .secrets_versions_access(resource)
            .doit()
            .await
            .map_err(|e| SecretError::retrieve_failed(token, e))?;
        drop(hub);

        let data = response
            .payload
            .and_then(|payload| payload.data)
            .unwrap_or_default();
        Ok(payload_text(&data))
    }

    async fn access_cli(token: &Token, resource: &str) -> Result<String, SecretError> {
        let output = Command::new("gcloud")
            .args(["secrets", "versions", "access", resource])
            .output()
            .await
            .map_err(|e| SecretError::retrieve_failed(token, format!("failed to execute gcloud CLI: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SecretError::retrieve_failed(
                token,
                format!("gcloud CLI failed: {}", stderr.trim()),
            ));
        }

        Ok(payload_text(&output.stdout))
    }
}

/// Secret payload as text, whitespace kept
fn payload_text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

#[async_trait]
impl SecretStore for GcpSecretsStore {
    fn set_token(&mut self, token: Token) {
        self.metadata = token.metadata();
        self.token = Some(token);
    }

    async fn fetch(&self) -> Result<String, SecretError> {
        let token = self.token.as_ref().ok_or_else(|| SecretError::InvalidConfig {
            message: "gcp store used before a token was set".to_string(),
        })?;
        let resource = resource_name(token.store_token(), &self.metadata);
        tracing::debug!(resource = %resource, "accessing secret version");

        let hub = self.hub.lock().await.take();
        cancellable(&self.cancel, token.full_token(), async {
            match hub {
                Some(hub) => Self::access_http(hub, token, &resource).await,
                None => Self::access_cli(token, &resource).await,
            }
        })
        .await
    }
}
