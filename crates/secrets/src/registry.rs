//! Store factory registry
//!
//! Maps each [`ImplementationPrefix`] to the [`StoreFactory`] that builds its
//! stores. A resolver takes its own copy, so overriding a prefix never
//! mutates a registry another resolver is using.

use crate::{ImplementationPrefix, SecretError, StoreFactory};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of store factories keyed by prefix
///
/// # Example
///
/// ```ignore
/// use configmanager_secrets::{ImplementationPrefix, StoreRegistry};
///
/// let registry = StoreRegistry::new()
///     .with_factory(ImplementationPrefix::AwsSecrets, Arc::new(SecretsManagerFactory));
///
/// let factory = registry.factory(ImplementationPrefix::AwsSecrets)?;
/// ```
#[derive(Clone, Default)]
pub struct StoreRegistry {
    factories: HashMap<ImplementationPrefix, Arc<dyn StoreFactory>>,
}

impl StoreRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory, replacing any existing one for the prefix
    pub fn register(&mut self, prefix: ImplementationPrefix, factory: Arc<dyn StoreFactory>) {
        self.factories.insert(prefix, factory);
    }

    /// Copy of this registry with `prefix` overridden
    #[must_use]
    pub fn with_factory(&self, prefix: ImplementationPrefix, factory: Arc<dyn StoreFactory>) -> Self {
        let mut copy = self.clone();
        copy.register(prefix, factory);
        copy
    }

    /// Look up the factory for a prefix
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::TokenInvalid`] if nothing is registered for it.
    pub fn factory(&self, prefix: ImplementationPrefix) -> Result<Arc<dyn StoreFactory>, SecretError> {
        self.factories
            .get(&prefix)
            .cloned()
            .ok_or_else(|| SecretError::TokenInvalid {
                prefix: prefix.to_string(),
            })
    }

    /// Check if a factory is registered for the prefix
    #[must_use]
    pub fn has(&self, prefix: ImplementationPrefix) -> bool {
        self.factories.contains_key(&prefix)
    }

    /// Registered prefixes, sorted
    #[must_use]
    pub fn prefixes(&self) -> Vec<ImplementationPrefix> {
        let mut prefixes: Vec<_> = self.factories.keys().copied().collect();
        prefixes.sort_unstable();
        prefixes
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("prefixes", &self.prefixes())
            .finish()
    }
}
