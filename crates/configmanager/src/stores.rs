//! Registry seeded with every built-in store

use configmanager_aws::{ParameterStoreFactory, SecretsManagerFactory};
use configmanager_azure::{AppConfigFactory, AzureAuth, KeyVaultFactory, TableStoreFactory};
use configmanager_gcp::GcpSecretsFactory;
use configmanager_secrets::{ImplementationPrefix, StoreRegistry};
use configmanager_vault::VaultFactory;
use std::sync::Arc;

/// A registry with a factory for every [`ImplementationPrefix`].
///
/// The Azure stores share one `DefaultAzureCredential`, built on first use.
#[must_use]
pub fn default_registry() -> StoreRegistry {
    let azure = Arc::new(AzureAuth::new());

    let mut registry = StoreRegistry::new();
    registry.register(
        ImplementationPrefix::AwsSecrets,
        Arc::new(SecretsManagerFactory::new()),
    );
    registry.register(
        ImplementationPrefix::AwsParamStore,
        Arc::new(ParameterStoreFactory::new()),
    );
    registry.register(
        ImplementationPrefix::AzKeyVault,
        Arc::new(KeyVaultFactory::new(Arc::clone(&azure))),
    );
    registry.register(
        ImplementationPrefix::AzTableStore,
        Arc::new(TableStoreFactory::new(Arc::clone(&azure))),
    );
    registry.register(
        ImplementationPrefix::AzAppConfig,
        Arc::new(AppConfigFactory::new(azure)),
    );
    registry.register(ImplementationPrefix::GcpSecrets, Arc::new(GcpSecretsFactory::new()));
    registry.register(ImplementationPrefix::HashiVault, Arc::new(VaultFactory::new()));

    tracing::debug!(stores = registry.prefixes().len(), "store registry seeded");
    registry
}
