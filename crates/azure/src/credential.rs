//! Azure AD credentials shared by the Azure stores
//!
//! Unless a credential is supplied, tokens come from the Azure SDK's
//! `DefaultAzureCredential`: an environment service principal, workload
//! identity, managed identity, then the Azure CLI session.

use azure_core::credentials::TokenCredential;
use azure_identity::DefaultAzureCredential;
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// One credential and HTTP client for every Azure store of a registry.
///
/// The default credential chain is built on first use, so registries that
/// never see an Azure token never look for credentials.
pub struct AzureAuth {
    credential: OnceCell<Arc<dyn TokenCredential>>,
    http: reqwest::Client,
}

impl std::fmt::Debug for AzureAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureAuth")
            .field("initialized", &self.credential.initialized())
            .finish_non_exhaustive()
    }
}

impl Default for AzureAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureAuth {
    /// Authenticate through `DefaultAzureCredential`
    #[must_use]
    pub fn new() -> Self {
        Self {
            credential: OnceCell::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Authenticate through `credential` instead of the default chain
    #[must_use]
    pub fn with_credential(credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            credential: OnceCell::new_with(Some(credential)),
            http: reqwest::Client::new(),
        }
    }

    /// HTTP client for the REST stores
    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The credential, building the default chain on first call.
    ///
    /// # Errors
    ///
    /// Returns the SDK error if the default chain cannot be constructed.
    pub async fn credential(&self) -> azure_core::Result<Arc<dyn TokenCredential>> {
        self.credential
            .get_or_try_init(|| async {
                tracing::debug!("building DefaultAzureCredential");
                let credential: Arc<dyn TokenCredential> = DefaultAzureCredential::new()?;
                Ok(credential)
            })
            .await
            .cloned()
    }

    /// Bearer token for `scope`. Caching and refresh are the credential's.
    ///
    /// # Errors
    ///
    /// Returns the SDK error if no credential in the chain yields a token.
    pub async fn bearer(&self, scope: &str) -> azure_core::Result<SecretString> {
        let credential = self.credential().await?;
        let token = credential.get_token(&[scope]).await?;
        Ok(SecretString::from(token.token.secret().to_string()))
    }
}
