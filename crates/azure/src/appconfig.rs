//! Azure App Configuration store
//!
//! `AZAPPCONF:///mycfg/app/db/host[label=prod]` reads key `app/db/host` with
//! label `prod` from `https://mycfg.azconfig.io`.

use crate::{AzureAuth, check_status, service_key, service_url, with_segments};
use async_trait::async_trait;
use configmanager_secrets::{SecretError, SecretStore, StoreFactory, Token, cancellable};
use reqwest::{StatusCode, Url};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const STORE: &str = "azure-app-configuration";
const URL_TEMPLATE: &str = "https://{}.azconfig.io";
const API_VERSION: &str = "1.0";

/// Metadata recognised on `AZAPPCONF` tokens
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfigMetadata {
    /// Key label; the null label when empty
    #[serde(default)]
    pub label: String,
    /// Conditional fetch: an unchanged key comes back empty
    #[serde(default)]
    pub etag: String,
    /// Read the key as of this RFC 1123 timestamp
    #[serde(default)]
    pub accepted_date_time: String,
}

impl AppConfigMetadata {
    fn if_none_match(&self) -> Option<String> {
        if self.etag.is_empty() {
            None
        } else if self.etag.starts_with('"') {
            Some(self.etag.clone())
        } else {
            Some(format!("\"{}\"", self.etag))
        }
    }
}

/// Builds [`AppConfigStore`]s
#[derive(Debug, Clone)]
pub struct AppConfigFactory {
    auth: Arc<AzureAuth>,
    endpoint: Option<Url>,
}

impl AppConfigFactory {
    /// Factory authenticating through `auth`
    #[must_use]
    pub fn new(auth: Arc<AzureAuth>) -> Self {
        Self {
            auth,
            endpoint: None,
        }
    }

    /// Send every request to `endpoint` instead of the store's public URL
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }
}

#[async_trait]
impl StoreFactory for AppConfigFactory {
    async fn build(
        &self,
        cancel: CancellationToken,
        token: &Token,
    ) -> Result<Box<dyn SecretStore>, SecretError> {
        let (instance, _) = service_key(token.store_token());
        let base = service_url(STORE, self.endpoint.as_ref(), URL_TEMPLATE, instance)?;
        let scope = format!("https://{instance}.azconfig.io/.default");
        Ok(Box::new(AppConfigStore {
            auth: Arc::clone(&self.auth),
            base,
            scope,
            cancel,
            token: None,
            metadata: AppConfigMetadata::default(),
        }))
    }
}

/// Fetches one configuration key
#[derive(Debug)]
pub struct AppConfigStore {
    auth: Arc<AzureAuth>,
    base: Url,
    scope: String,
    cancel: CancellationToken,
    token: Option<Token>,
    metadata: AppConfigMetadata,
}

#[derive(Deserialize)]
struct KeyValue {
    #[serde(default)]
    value: Option<String>,
}

impl AppConfigStore {
    async fn get(&self, token: &Token) -> Result<String, SecretError> {
        let (_, key) = service_key(token.store_token());
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(SecretError::incorrectly_structured(
                token,
                "expected <config-store>/<key>",
            ));
        }

        let mut url = with_segments(&self.base, token, ["kv", key])?;
        {
            let mut query = url.query_pairs_mut();
            if !self.metadata.label.is_empty() {
                query.append_pair("label", &self.metadata.label);
            }
            query.append_pair("api-version", API_VERSION);
        }

        let bearer = self
            .auth
            .bearer(&self.scope)
            .await
            .map_err(|e| SecretError::retrieve_failed(token, e))?;

        let mut request = self
            .auth
            .http()
            .get(url.clone())
            .bearer_auth(bearer.expose_secret());
        if let Some(etag) = self.metadata.if_none_match() {
            request = request.header("If-None-Match", etag);
        }
        if !self.metadata.accepted_date_time.is_empty() {
            request = request.header("Accept-Datetime", &self.metadata.accepted_date_time);
        }

        tracing::debug!(url = %url, "requesting configuration key");
        let response = request
            .send()
            .await
            .map_err(|e| SecretError::retrieve_failed(token, e))?;
        let response = check_status(token, response).await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            tracing::debug!("configuration key not modified since etag");
            return Ok(String::new());
        }

        let kv: KeyValue = response
            .json()
            .await
            .map_err(|e| SecretError::retrieve_failed(token, e))?;
        Ok(kv.value.unwrap_or_default())
    }
}

#[async_trait]
impl SecretStore for AppConfigStore {
    fn set_token(&mut self, token: Token) {
        self.metadata = token.metadata();
        self.token = Some(token);
    }

    async fn fetch(&self) -> Result<String, SecretError> {
        let token = self.token.as_ref().ok_or_else(|| SecretError::InvalidConfig {
            message: "app configuration store used before a token was set".to_string(),
        })?;
        cancellable(&self.cancel, token.full_token(), self.get(token)).await
    }
}
