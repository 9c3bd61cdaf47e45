use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Instant,
};

use pkgsync_registry::{create_adapter, EcosystemAdapter, RegistryHandle};
use pkgsync_utils::time::RefreshInterval;
use tracing::debug;

pub type AdapterFactory = Arc<dyn Fn(RegistryHandle) -> Arc<dyn EcosystemAdapter> + Send + Sync>;

struct CachedAdapter {
    built_at: Instant,
    handle: RegistryHandle,
    adapter: Arc<dyn EcosystemAdapter>,
}

/// One adapter per registry, rebuilt once older than the refresh interval.
///
/// An adapter is never mutated after construction; refreshing swaps in a new
/// instance whose index is fetched lazily. Tasks already holding the old one
/// keep using it.
pub struct AdapterCache {
    refresh: RefreshInterval,
    factory: AdapterFactory,
    entries: Mutex<HashMap<i32, CachedAdapter>>,
}

impl AdapterCache {
    pub fn new(refresh: RefreshInterval) -> Self {
        Self::with_factory(
            refresh,
            Arc::new(|handle: RegistryHandle| -> Arc<dyn EcosystemAdapter> {
                Arc::from(create_adapter(handle))
            }),
        )
    }

    pub fn with_factory(refresh: RefreshInterval, factory: AdapterFactory) -> Self {
        Self {
            refresh,
            factory,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, handle: &RegistryHandle) -> Arc<dyn EcosystemAdapter> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(cached) = entries.get(&handle.id) {
            if cached.handle == *handle && !self.refresh.is_stale(cached.built_at.elapsed()) {
                return cached.adapter.clone();
            }
        }

        debug!(registry = %handle.name, ecosystem = %handle.ecosystem, "building adapter");
        let adapter = (self.factory)(handle.clone());
        entries.insert(
            handle.id,
            CachedAdapter {
                built_at: Instant::now(),
                handle: handle.clone(),
                adapter: adapter.clone(),
            },
        );
        adapter
    }
}
