//! Azure stores for configmanager
//!
//! - [`KeyVaultFactory`]: `AZKVSECRET` tokens via the Key Vault secrets SDK
//! - [`TableStoreFactory`]: `AZTABLESTORE` tokens via the Table service REST API
//! - [`AppConfigFactory`]: `AZAPPCONF` tokens via the App Configuration REST API
//!
//! All three authenticate through one shared [`AzureAuth`], which wraps an
//! `azure_identity` credential (`DefaultAzureCredential` unless supplied).

mod appconfig;
mod credential;
mod keyvault;
mod tables;

pub use appconfig::{AppConfigFactory, AppConfigMetadata, AppConfigStore};
pub use credential::AzureAuth;
pub use keyvault::{KeyVaultFactory, KeyVaultMetadata, KeyVaultStore};
pub use tables::{TableEntityKey, TableStore, TableStoreFactory};

use configmanager_secrets::{SecretError, Token};
use reqwest::{Response, Url};

/// Split a store token into its service name and the key beneath it.
///
/// One leading `/` on the token is ignored. The key keeps the `/` that
/// separated it from the service name, so `vault/a/b` yields `("vault", "/a/b")`.
#[must_use]
pub fn service_key(store_token: &str) -> (&str, &str) {
    let trimmed = store_token.strip_prefix('/').unwrap_or(store_token);
    trimmed
        .find('/')
        .map_or((trimmed, ""), |idx| trimmed.split_at(idx))
}

/// Base URL of a service: `endpoint` when overridden, otherwise `template`
/// with `{}` replaced by the service name.
pub(crate) fn service_url(
    store: &'static str,
    endpoint: Option<&Url>,
    template: &str,
    service: &str,
) -> Result<Url, SecretError> {
    if let Some(endpoint) = endpoint {
        return Ok(endpoint.clone());
    }
    if service.is_empty() {
        return Err(SecretError::ClientInitialization {
            store,
            message: "token does not name a service instance".to_string(),
        });
    }
    Url::parse(&template.replace("{}", service)).map_err(|e| SecretError::ClientInitialization {
        store,
        message: format!("invalid service URL for '{service}': {e}"),
    })
}

/// Append `segments` to the path of `base`, percent-encoding each one.
pub(crate) fn with_segments<'a>(
    base: &Url,
    token: &Token,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<Url, SecretError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| SecretError::incorrectly_structured(token, "service URL cannot take a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Turn a non-success response into an error. Server-side failures are left
/// unclassified; everything else is a retrieval failure.
pub(crate) async fn check_status(token: &Token, response: Response) -> Result<Response, SecretError> {
    let status = response.status();
    if status.is_success() || status == reqwest::StatusCode::NOT_MODIFIED {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{status}: {}", body.trim());
    if status.is_server_error() {
        Err(SecretError::ServiceCallFailed {
            token: token.full_token().to_string(),
            message,
        })
    } else {
        Err(SecretError::retrieve_failed(token, message))
    }
}
