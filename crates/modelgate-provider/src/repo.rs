//! Provider repository: the read interface the core consumes. Persistence
//! lives behind this trait; the in-memory implementation backs the binary
//! (loaded from a JSON file at startup) and the tests.

use std::sync::RwLock;

use crate::provider::{Provider, ProviderId};

pub trait ProviderRepository: Send + Sync {
    /// All enabled, non-tombstoned providers.
    fn list_enabled(&self) -> Vec<Provider>;

    fn by_id(&self, id: ProviderId) -> Option<Provider>;
}

#[derive(Debug, Default)]
pub struct MemoryProviderRepository {
    providers: RwLock<Vec<Provider>>,
}

impl MemoryProviderRepository {
    pub fn new(providers: Vec<Provider>) -> Self {
        Self {
            providers: RwLock::new(providers),
        }
    }

    pub fn replace(&self, providers: Vec<Provider>) {
        *self.providers.write().expect("provider repo lock") = providers;
    }
}

impl ProviderRepository for MemoryProviderRepository {
    fn list_enabled(&self) -> Vec<Provider> {
        self.providers
            .read()
            .expect("provider repo lock")
            .iter()
            .filter(|provider| provider.enabled && !provider.is_tombstoned())
            .cloned()
            .collect()
    }

    fn by_id(&self, id: ProviderId) -> Option<Provider> {
        self.providers
            .read()
            .expect("provider repo lock")
            .iter()
            .find(|provider| provider.id == id)
            .cloned()
    }
}
