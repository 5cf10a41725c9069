//! Façade and command behaviour against in-memory stores

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use configmanager::commands;
use configmanager::output::Destination;
use configmanager::{
    Config, ConfigManager, ConfigManagerError, ErrorKind, ImplementationPrefix, InputFormat,
    SecretError, SecretStore, StoreFactory, StoreRegistry, Token,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Serves canned values keyed by store token
#[derive(Clone, Default)]
struct CannedFactory {
    values: HashMap<String, String>,
}

impl CannedFactory {
    fn with(mut self, store_token: &str, value: &str) -> Self {
        self.values
            .insert(store_token.to_string(), value.to_string());
        self
    }
}

struct CannedStore {
    values: HashMap<String, String>,
    token: Option<Token>,
}

#[async_trait]
impl SecretStore for CannedStore {
    fn set_token(&mut self, token: Token) {
        self.token = Some(token);
    }

    async fn fetch(&self) -> Result<String, SecretError> {
        let token = self.token.as_ref().expect("token bound before fetch");
        self.values
            .get(token.store_token())
            .cloned()
            .ok_or_else(|| SecretError::retrieve_failed(token, "not found"))
    }
}

#[async_trait]
impl StoreFactory for CannedFactory {
    async fn build(
        &self,
        _cancel: CancellationToken,
        _token: &Token,
    ) -> Result<Box<dyn SecretStore>, SecretError> {
        Ok(Box::new(CannedStore {
            values: self.values.clone(),
            token: None,
        }))
    }
}

fn manager() -> ConfigManager {
    let aws = CannedFactory::default()
        .with("foo/bar", "s1")
        .with("a/b/some-key", "v")
        .with("dbcreds", r#"{"user":"u","password":"p"}"#);
    let ssm = CannedFactory::default().with("baz", "p1");
    let registry = StoreRegistry::new()
        .with_factory(ImplementationPrefix::AwsSecrets, Arc::new(aws))
        .with_factory(ImplementationPrefix::AwsParamStore, Arc::new(ssm));
    ConfigManager::with_registry(registry, Config::default()).unwrap()
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct AppConfig {
    name: String,
    password: String,
    port: u16,
}

#[tokio::test]
async fn retrieve_returns_map_keyed_by_full_token() {
    let resolved = manager()
        .retrieve(["AWSSECRETS://foo/bar", "AWSPARAMSTR://baz[version=7]"])
        .await
        .unwrap();
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved.text("AWSSECRETS://foo/bar").as_deref(), Some("s1"));
    assert_eq!(
        resolved.text("AWSPARAMSTR://baz[version=7]").as_deref(),
        Some("p1")
    );
}

#[tokio::test]
async fn retrieve_replaced_substitutes_in_text() {
    let out = manager()
        .retrieve_replaced("pwd='AWSSECRETS://foo/bar'")
        .await
        .unwrap();
    assert_eq!(out, "pwd='s1'");
}

#[tokio::test]
async fn marshalled_into_replaces_record_fields() {
    let mut record = AppConfig {
        name: "api".to_string(),
        password: "AWSSECRETS://dbcreds|password".to_string(),
        port: 8080,
    };
    manager().marshalled_into(&mut record).await.unwrap();
    assert_eq!(
        record,
        AppConfig {
            name: "api".to_string(),
            password: "p".to_string(),
            port: 8080,
        }
    );
}

#[tokio::test]
async fn unmarshal_from_json() {
    let input = br#"{"name":"api","password":"AWSSECRETS://foo/bar","port":1}"#;
    let record: AppConfig = manager()
        .unmarshal_from(input, InputFormat::Json)
        .await
        .unwrap();
    assert_eq!(record.password, "s1");
}

#[tokio::test]
async fn unmarshal_from_yaml() {
    let input = b"name: api\npassword: AWSSECRETS://dbcreds|password\nport: 5432\n";
    let record: AppConfig = manager()
        .unmarshal_from(input, InputFormat::Yaml)
        .await
        .unwrap();
    assert_eq!(record.password, "p");
    assert_eq!(record.port, 5432);
}

#[tokio::test]
async fn unmarshal_from_surfaces_decode_errors() {
    let err = manager()
        .unmarshal_from::<AppConfig>(b"{\"name\": 1}", InputFormat::Json)
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigManagerError::Json(_)));

    let err = manager()
        .unmarshal_from::<AppConfig>(&[0xff, 0xfe], InputFormat::Yaml)
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigManagerError::Utf8(_)));
}

#[tokio::test]
async fn nothing_resolved_is_an_error() {
    let err = manager()
        .retrieve(["AWSSECRETS://missing"])
        .await
        .unwrap_err();
    assert_eq!(err.secret_kind(), Some(ErrorKind::NothingResolved));
}

#[tokio::test]
async fn retrieve_command_writes_export_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.env");

    commands::retrieve(
        &manager(),
        &["AWSSECRETS://a/b/some-key".to_string()],
        &Destination::File(path.clone()),
    )
    .await
    .unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "export SOME_KEY='v'\n");
}

#[tokio::test]
async fn retrieve_command_expands_json_secret() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.env");

    commands::retrieve(
        &manager(),
        &["AWSSECRETS://dbcreds".to_string()],
        &Destination::File(path.clone()),
    )
    .await
    .unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "export PASSWORD='p'\nexport USER='u'\n"
    );
}

#[tokio::test]
async fn from_file_input_rewrites_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.env");
    fs::write(&path, "USER=AWSSECRETS://dbcreds|user\nPLAIN=1\n").unwrap();

    commands::from_file_input(&manager(), &path, &Destination::File(path.clone()))
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "USER=u\nPLAIN=1\n");
}

#[tokio::test]
async fn from_file_input_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.env");
    let err = commands::from_file_input(&manager(), &missing, &Destination::Stdout)
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigManagerError::Io { operation: "read", .. }));
}

#[tokio::test]
async fn string_input_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");

    commands::string_input(
        &manager(),
        "a=AWSSECRETS://foo/bar b=AWSPARAMSTR://baz",
        &Destination::File(path.clone()),
    )
    .await
    .unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "a=s1 b=p1");
}

#[tokio::test]
async fn string_input_naming_a_file_rewrites_it_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.env");
    fs::write(&path, "pwd='AWSSECRETS://foo/bar'\nplain='x'\n").unwrap();
    let raw = path.to_str().unwrap();

    commands::string_input(&manager(), raw, &Destination::parse(raw))
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "pwd='s1'\nplain='x'\n");
}

#[tokio::test]
async fn string_input_naming_a_file_without_tokens_keeps_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.env");
    fs::write(&path, "pwd='plain'").unwrap();
    let raw = path.to_str().unwrap();

    commands::string_input(&manager(), raw, &Destination::parse(raw))
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "pwd='plain'");
}

#[tokio::test]
async fn cancelled_command_is_interrupted() {
    let manager = manager();
    manager.cancellation_token().cancel();
    let err = commands::string_input(&manager, "no tokens here", &Destination::Stdout)
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigManagerError::Interrupted));
}
