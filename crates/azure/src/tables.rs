//! Azure Table Storage store
//!
//! `AZTABLESTORE:///account/table/partition/row` reads one entity. When the
//! entity has a `value` property only that property is returned, otherwise
//! the whole entity as JSON.

use crate::{AzureAuth, check_status, service_url, with_segments};
use async_trait::async_trait;
use configmanager_secrets::{SecretError, SecretStore, StoreFactory, Token, cancellable, value_text};
use reqwest::Url;
use secrecy::ExposeSecret;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const STORE: &str = "azure-table-storage";
const URL_TEMPLATE: &str = "https://{}.table.core.windows.net";
const SCOPE: &str = "https://storage.azure.com/.default";
const API_VERSION: &str = "2020-12-06";
const ACCEPT: &str = "application/json;odata=nometadata";

/// The four parts of a table store token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntityKey<'a> {
    /// Storage account
    pub account: &'a str,
    /// Table name
    pub table: &'a str,
    /// Partition key
    pub partition_key: &'a str,
    /// Row key; may itself contain `/`
    pub row_key: &'a str,
}

impl<'a> TableEntityKey<'a> {
    /// Split a store token into its entity address.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::IncorrectlyStructuredToken`] unless the token
    /// has non-empty account, table, partition and row segments.
    pub fn parse(token: &'a Token) -> Result<Self, SecretError> {
        let trimmed = token.store_token().trim_start_matches('/');
        let mut parts = trimmed.splitn(4, '/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(account), Some(table), Some(partition_key), Some(row_key))
                if ![account, table, partition_key, row_key].contains(&"") =>
            {
                Ok(Self {
                    account,
                    table,
                    partition_key,
                    row_key,
                })
            }
            _ => Err(SecretError::incorrectly_structured(
                token,
                "expected <account>/<table>/<partitionKey>/<rowKey>",
            )),
        }
    }

    /// The entity path segment, e.g. `tbl(PartitionKey='pk',RowKey='rk')`
    #[must_use]
    pub fn entity_segment(&self) -> String {
        format!(
            "{}(PartitionKey='{}',RowKey='{}')",
            self.table,
            self.partition_key.replace('\'', "''"),
            self.row_key.replace('\'', "''"),
        )
    }
}

/// Builds [`TableStore`]s
#[derive(Debug, Clone)]
pub struct TableStoreFactory {
    auth: Arc<AzureAuth>,
    endpoint: Option<Url>,
}

impl TableStoreFactory {
    /// Factory authenticating through `auth`
    #[must_use]
    pub fn new(auth: Arc<AzureAuth>) -> Self {
        Self {
            auth,
            endpoint: None,
        }
    }

    /// Send every request to `endpoint` instead of the account's public URL
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }
}

#[async_trait]
impl StoreFactory for TableStoreFactory {
    async fn build(
        &self,
        cancel: CancellationToken,
        token: &Token,
    ) -> Result<Box<dyn SecretStore>, SecretError> {
        let key = TableEntityKey::parse(token)?;
        let base = service_url(STORE, self.endpoint.as_ref(), URL_TEMPLATE, key.account)?;
        Ok(Box::new(TableStore {
            auth: Arc::clone(&self.auth),
            base,
            cancel,
            token: None,
        }))
    }
}

/// Fetches one table entity
#[derive(Debug)]
pub struct TableStore {
    auth: Arc<AzureAuth>,
    base: Url,
    cancel: CancellationToken,
    token: Option<Token>,
}

impl TableStore {
    async fn get(&self, token: &Token) -> Result<String, SecretError> {
        let key = TableEntityKey::parse(token)?;
        let url = with_segments(&self.base, token, [key.entity_segment().as_str()])?;

        let bearer = self
            .auth
            .bearer(SCOPE)
            .await
            .map_err(|e| SecretError::retrieve_failed(token, e))?;

        tracing::debug!(url = %url, "requesting table entity");
        let response = self
            .auth
            .http()
            .get(url)
            .bearer_auth(bearer.expose_secret())
            .header("Accept", ACCEPT)
            .header("x-ms-version", API_VERSION)
            .header("x-ms-date", http_date())
            .send()
            .await
            .map_err(|e| SecretError::retrieve_failed(token, e))?;
        let response = check_status(token, response).await?;

        let body = response
            .text()
            .await
            .map_err(|e| SecretError::retrieve_failed(token, e))?;
        Ok(entity_value(body))
    }
}

/// The entity's `value` property as text when present, otherwise the body.
fn entity_value(body: String) -> String {
    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(mut entity)) => match entity.remove("value") {
            Some(value) => value_text(&value),
            None => body,
        },
        _ => body,
    }
}

fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

#[async_trait]
impl SecretStore for TableStore {
    fn set_token(&mut self, token: Token) {
        self.token = Some(token);
    }

    async fn fetch(&self) -> Result<String, SecretError> {
        let token = self.token.as_ref().ok_or_else(|| SecretError::InvalidConfig {
            message: "table store used before a token was set".to_string(),
        })?;
        cancellable(&self.cancel, token.full_token(), self.get(token)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::test_support::static_auth;
    use configmanager_secrets::Config;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token(raw: &str) -> Token {
        Token::parse(raw, &Config::default()).unwrap()
    }

    fn factory(server: &MockServer) -> TableStoreFactory {
        let auth = static_auth("st-token");
        TableStoreFactory::new(auth).with_endpoint(Url::parse(&server.uri()).unwrap())
    }

    #[test]
    fn test_parse_entity_key() {
        let t = token("AZTABLESTORE:///acct/tbl/pk/rk");
        let key = TableEntityKey::parse(&t).unwrap();
        assert_eq!(key.account, "acct");
        assert_eq!(key.table, "tbl");
        assert_eq!(key.partition_key, "pk");
        assert_eq!(key.row_key, "rk");
        assert_eq!(key.entity_segment(), "tbl(PartitionKey='pk',RowKey='rk')");
    }

    #[test]
    fn test_row_key_keeps_slashes() {
        let t = token("AZTABLESTORE://acct/tbl/pk/a/b");
        assert_eq!(TableEntityKey::parse(&t).unwrap().row_key, "a/b");
    }

    #[test]
    fn test_quotes_are_doubled() {
        let t = token("AZTABLESTORE://acct/tbl/o'brien/rk");
        let segment = TableEntityKey::parse(&t).unwrap().entity_segment();
        assert_eq!(segment, "tbl(PartitionKey='o''brien',RowKey='rk')");
    }

    #[test]
    fn test_short_token_is_incorrectly_structured() {
        for raw in ["AZTABLESTORE://acct/tbl", "AZTABLESTORE://acct/tbl/pk", "AZTABLESTORE://acct//pk/rk"] {
            let t = token(raw);
            let err = TableEntityKey::parse(&t).unwrap_err();
            assert!(matches!(err, SecretError::IncorrectlyStructuredToken { .. }), "{raw}");
        }
    }

    #[test]
    fn test_entity_value() {
        assert_eq!(entity_value(r#"{"value":"foo.bar.com"}"#.to_string()), "foo.bar.com");
        assert_eq!(entity_value(r#"{"value":42,"x":1}"#.to_string()), "42");
        let whole = r#"{"host":"h","port":1}"#.to_string();
        assert_eq!(entity_value(whole.clone()), whole);
    }

    #[tokio::test]
    async fn test_build_rejects_short_token() {
        let server = MockServer::start().await;
        let err = factory(&server)
            .build(CancellationToken::new(), &token("AZTABLESTORE://acct/tbl/pk"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SecretError::IncorrectlyStructuredToken { .. }));
    }

    #[tokio::test]
    async fn test_fetch_value_property() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tbl(PartitionKey='pk',RowKey='rk')"))
            .and(header("authorization", "Bearer st-token"))
            .and(header("accept", ACCEPT))
            .and(header_exists("x-ms-date"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "PartitionKey": "pk",
                "RowKey": "rk",
                "value": "foo.bar.com"
            })))
            .mount(&server)
            .await;

        let t = token("AZTABLESTORE:///acct/tbl/pk/rk");
        let mut store = factory(&server)
            .build(CancellationToken::new(), &t)
            .await
            .unwrap();
        store.set_token(t);
        assert_eq!(store.fetch().await.unwrap(), "foo.bar.com");
    }

    #[tokio::test]
    async fn test_missing_entity_is_retrieve_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("ResourceNotFound"))
            .mount(&server)
            .await;

        let t = token("AZTABLESTORE://acct/tbl/pk/missing");
        let mut store = factory(&server)
            .build(CancellationToken::new(), &t)
            .await
            .unwrap();
        store.set_token(t);
        let err = store.fetch().await.unwrap_err();
        assert!(matches!(err, SecretError::RetrieveFailed { .. }));
    }
}
