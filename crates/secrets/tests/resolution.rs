//! End-to-end resolution scenarios against in-memory stores

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use configmanager_secrets::{
    Config, ErrorKind, ImplementationPrefix, Resolver, SecretError, SecretStore, StoreFactory,
    StoreRegistry, Token, cancellable,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Serves canned responses keyed by store token and counts fetches
#[derive(Default)]
struct MapFactory {
    values: HashMap<String, Result<String, String>>,
    fetches: Arc<AtomicUsize>,
}

impl MapFactory {
    fn ok(mut self, store_token: &str, value: &str) -> Self {
        self.values
            .insert(store_token.to_string(), Ok(value.to_string()));
        self
    }

    fn fail(mut self, store_token: &str, message: &str) -> Self {
        self.values
            .insert(store_token.to_string(), Err(message.to_string()));
        self
    }
}

struct MapStore {
    values: HashMap<String, Result<String, String>>,
    fetches: Arc<AtomicUsize>,
    token: Option<Token>,
}

#[async_trait]
impl SecretStore for MapStore {
    fn set_token(&mut self, token: Token) {
        self.token = Some(token);
    }

    async fn fetch(&self) -> Result<String, SecretError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let token = self.token.as_ref().expect("token bound before fetch");
        match self.values.get(token.store_token()) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(message)) => Err(SecretError::retrieve_failed(token, message)),
            None => Err(SecretError::retrieve_failed(token, "not found")),
        }
    }
}

#[async_trait]
impl StoreFactory for MapFactory {
    async fn build(
        &self,
        _cancel: CancellationToken,
        _token: &Token,
    ) -> Result<Box<dyn SecretStore>, SecretError> {
        Ok(Box::new(MapStore {
            values: self.values.clone(),
            fetches: Arc::clone(&self.fetches),
            token: None,
        }))
    }
}

/// Never completes unless cancelled
struct StallingFactory;

struct StallingStore {
    cancel: CancellationToken,
    token: Option<Token>,
}

#[async_trait]
impl SecretStore for StallingStore {
    fn set_token(&mut self, token: Token) {
        self.token = Some(token);
    }

    async fn fetch(&self) -> Result<String, SecretError> {
        let token = self.token.as_ref().expect("token bound before fetch");
        cancellable(&self.cancel, token.full_token(), std::future::pending()).await
    }
}

#[async_trait]
impl StoreFactory for StallingFactory {
    async fn build(
        &self,
        cancel: CancellationToken,
        _token: &Token,
    ) -> Result<Box<dyn SecretStore>, SecretError> {
        Ok(Box::new(StallingStore {
            cancel,
            token: None,
        }))
    }
}

fn registry_with(prefix: ImplementationPrefix, factory: MapFactory) -> StoreRegistry {
    StoreRegistry::new().with_factory(prefix, Arc::new(factory))
}

#[tokio::test]
async fn list_resolve_across_prefixes() {
    let mut registry = StoreRegistry::new();
    registry.register(
        ImplementationPrefix::AwsSecrets,
        Arc::new(MapFactory::default().ok("foo/bar", "s1")),
    );
    registry.register(
        ImplementationPrefix::AwsParamStore,
        Arc::new(MapFactory::default().ok("baz", "p1")),
    );
    let resolver = Resolver::new(registry).unwrap();

    let resolved = resolver
        .resolve(["AWSSECRETS://foo/bar", "AWSPARAMSTR://baz[version=7]"])
        .await
        .unwrap();

    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved.get("AWSSECRETS://foo/bar"), Some(&json!("s1")));
    assert_eq!(resolved.get("AWSPARAMSTR://baz[version=7]"), Some(&json!("p1")));
    assert!(resolved.failures().is_empty());
}

#[tokio::test]
async fn text_substitution_keeps_surrounding_bytes() {
    let registry = registry_with(
        ImplementationPrefix::AwsSecrets,
        MapFactory::default().ok("foo/bar", "s1"),
    );
    let resolver = Resolver::new(registry).unwrap();

    let out = resolver.resolve_text("pwd='AWSSECRETS://foo/bar'").await.unwrap();
    assert_eq!(out, "pwd='s1'");
}

#[tokio::test]
async fn json_key_path_descent() {
    let registry = registry_with(
        ImplementationPrefix::AwsSecrets,
        MapFactory::default().ok("dbcreds", r#"{"user":"u","password":"p"}"#),
    );
    let resolver = Resolver::new(registry).unwrap();

    let resolved = resolver
        .resolve(["AWSSECRETS://dbcreds|password"])
        .await
        .unwrap();
    assert_eq!(resolved.get("AWSSECRETS://dbcreds|password"), Some(&json!("p")));
}

#[tokio::test]
async fn key_path_with_metadata_after_it() {
    let registry = registry_with(
        ImplementationPrefix::AwsSecrets,
        MapFactory::default().ok("dbcreds", r#"{"port":5432}"#),
    );
    let resolver = Resolver::new(registry).unwrap();

    let token = "AWSSECRETS://dbcreds|port[version=2]";
    let resolved = resolver.resolve([token]).await.unwrap();
    assert_eq!(resolved.get(token), Some(&json!("5432")));
}

#[tokio::test]
async fn partial_failure_keeps_successes() {
    let registry = registry_with(
        ImplementationPrefix::AwsSecrets,
        MapFactory::default().ok("ok", "x").fail("broken", "access denied"),
    );
    let resolver = Resolver::new(registry).unwrap();

    let resolved = resolver
        .resolve(["AWSSECRETS://ok", "AWSSECRETS://broken"])
        .await
        .unwrap();

    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved.get("AWSSECRETS://ok"), Some(&json!("x")));
    assert!(!resolved.contains("AWSSECRETS://broken"));
    assert_eq!(resolved.failures().len(), 1);
    assert_eq!(resolved.failures()[0].token, "AWSSECRETS://broken");
    assert_eq!(resolved.failures()[0].error.kind(), ErrorKind::RetrieveFailed);
}

#[tokio::test]
async fn total_failure_is_an_error() {
    let registry = registry_with(
        ImplementationPrefix::AwsSecrets,
        MapFactory::default().fail("broken", "timeout"),
    );
    let resolver = Resolver::new(registry).unwrap();

    let err = resolver.resolve(["AWSSECRETS://broken"]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NothingResolved);
}

#[tokio::test]
async fn empty_value_is_recorded() {
    let registry = registry_with(
        ImplementationPrefix::AwsParamStore,
        MapFactory::default().ok("/blank", ""),
    );
    let resolver = Resolver::new(registry).unwrap();

    let resolved = resolver.resolve(["AWSPARAMSTR:///blank"]).await.unwrap();
    assert_eq!(resolved.get("AWSPARAMSTR:///blank"), Some(&json!("")));
}

#[tokio::test]
async fn duplicates_fetch_once() {
    let factory = MapFactory::default().ok("a", "1").ok("b", "2");
    let fetches = Arc::clone(&factory.fetches);
    let resolver =
        Resolver::new(registry_with(ImplementationPrefix::AwsSecrets, factory)).unwrap();

    let resolved = resolver
        .resolve([
            "AWSSECRETS://a",
            "AWSSECRETS://a",
            "AWSSECRETS://b",
            "AWSSECRETS://a",
            "not a token",
        ])
        .await
        .unwrap();

    assert_eq!(resolved.len(), 2);
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn repeated_token_in_text_fetches_once() {
    let factory = MapFactory::default().ok("a", "v");
    let fetches = Arc::clone(&factory.fetches);
    let resolver =
        Resolver::new(registry_with(ImplementationPrefix::AwsSecrets, factory)).unwrap();

    let out = resolver
        .resolve_text("x=AWSSECRETS://a\ny=AWSSECRETS://a\nz=\"AWSSECRETS://a\"")
        .await
        .unwrap();

    assert_eq!(out, "x=v\ny=v\nz=\"v\"");
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn substitution_is_idempotent() {
    let registry = registry_with(
        ImplementationPrefix::HashiVault,
        MapFactory::default().ok("secret___/app", r#"{"user":"admin"}"#),
    );
    let resolver = Resolver::new(registry).unwrap();

    let once = resolver
        .resolve_text("user: VAULT://secret___/app|user")
        .await
        .unwrap();
    let twice = resolver.resolve_text(&once).await.unwrap();

    assert_eq!(once, "user: admin");
    assert_eq!(twice, once);
}

#[tokio::test]
async fn text_without_known_prefix_is_untouched() {
    let factory = MapFactory::default();
    let fetches = Arc::clone(&factory.fetches);
    let resolver =
        Resolver::new(registry_with(ImplementationPrefix::AwsSecrets, factory)).unwrap();

    let text = "url: https://example.com/x|y\nFOO://bar AWSSECRETSX://a";
    assert_eq!(resolver.resolve_text(text).await.unwrap(), text);
    assert_eq!(fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn custom_separators() {
    let registry = registry_with(
        ImplementationPrefix::AwsSecrets,
        MapFactory::default().ok("app/db", r#"{"pass":"hunter2"}"#),
    );
    let config = Config::new()
        .with_token_separator("#")
        .with_key_separator("::");
    let resolver = Resolver::builder(registry).config(config).build().unwrap();

    let out = resolver
        .resolve_text("DB_PASS=AWSSECRETS#app/db::pass")
        .await
        .unwrap();
    assert_eq!(out, "DB_PASS=hunter2");
}

#[tokio::test]
async fn cancellation_drops_in_flight_tokens() {
    let registry = StoreRegistry::new()
        .with_factory(ImplementationPrefix::GcpSecrets, Arc::new(StallingFactory));
    let resolver = Resolver::new(registry).unwrap();
    let cancel = resolver.cancellation_token();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        resolver.resolve(["GCPSECRETS://projects/p/secrets/a", "GCPSECRETS://projects/p/secrets/b"]),
    )
    .await
    .expect("cancellation should end the batch")
    .unwrap_err();

    let SecretError::NothingResolved { failures } = err else {
        panic!("expected NothingResolved");
    };
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|f| f.error.kind() == ErrorKind::Cancelled));
}

#[tokio::test]
async fn worker_logs_nest_under_injected_span() {
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());
    let registry = registry_with(
        ImplementationPrefix::AzKeyVault,
        MapFactory::default().ok("kv/name", "v"),
    );
    let resolver = Resolver::builder(registry)
        .span(tracing::info_span!("deploy", env = "test"))
        .build()
        .unwrap();

    let resolved = resolver.resolve(["AZKVSECRET://kv/name"]).await.unwrap();
    assert_eq!(resolved.text("AZKVSECRET://kv/name").as_deref(), Some("v"));
}
