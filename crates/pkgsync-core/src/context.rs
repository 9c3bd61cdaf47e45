use std::sync::Arc;

use pkgsync_config::config::Config;
use pkgsync_db::{
    models::{NewRegistry, Registry},
    now_timestamp,
    repository::RegistryRepository,
    Database,
};
use pkgsync_registry::{Ecosystem, RegistryHandle};
use tracing::debug;

use crate::{
    error::{SyncError, SyncResult},
    events::{EventSink, EventSinkHandle, NullSink, SyncEvent},
};

/// Everything a sync operation needs: the store, the resolved configuration
/// and the sink progress is reported to. Cheap to clone.
#[derive(Clone)]
pub struct SyncContext {
    db: Database,
    config: Arc<Config>,
    events: EventSinkHandle,
}

impl SyncContext {
    pub fn new(config: Config, db: Database, events: EventSinkHandle) -> Self {
        Self {
            db,
            config: Arc::new(config),
            events,
        }
    }

    /// Opens the store at the configured path and seeds the configured registries.
    pub fn open(config: Config, events: EventSinkHandle) -> SyncResult<Self> {
        let path = config.get_db_path()?;
        debug!(path = %path.display(), "opening store");
        let db = Database::open(&path)?;
        let ctx = Self::new(config, db, events);
        ctx.seed_registries()?;
        Ok(ctx)
    }

    /// In-memory store with no event reporting.
    pub fn in_memory(config: Config) -> SyncResult<Self> {
        let ctx = Self::new(config, Database::open_in_memory()?, Arc::new(NullSink));
        ctx.seed_registries()?;
        Ok(ctx)
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }

    pub fn emit(&self, event: SyncEvent) {
        self.events.emit(event);
    }

    /// Upserts every configured registry into the store, keyed by name.
    pub fn seed_registries(&self) -> SyncResult<Vec<Registry>> {
        let now = now_timestamp();
        let seeded = self.db.transaction(|conn| {
            self.config
                .registries
                .iter()
                .map(|registry| {
                    RegistryRepository::upsert(
                        conn,
                        &NewRegistry {
                            name: &registry.name,
                            url: &registry.url,
                            ecosystem: registry.ecosystem.as_str(),
                            created_at: &now,
                            updated_at: &now,
                        },
                    )
                })
                .collect::<diesel::QueryResult<Vec<_>>>()
        })?;
        debug!(count = seeded.len(), "seeded registries");
        Ok(seeded)
    }

    pub fn registries(&self) -> SyncResult<Vec<Registry>> {
        Ok(self.db.with_conn(RegistryRepository::list_all)?)
    }

    pub fn registry_by_name(&self, name: &str) -> SyncResult<Registry> {
        self.db
            .with_conn(|conn| RegistryRepository::find_by_name(conn, name))?
            .ok_or_else(|| SyncError::UnknownRegistry(name.to_string()))
    }

    pub fn registry_by_id(&self, id: i32) -> SyncResult<Option<Registry>> {
        Ok(self
            .db
            .with_conn(|conn| RegistryRepository::find_by_id(conn, id))?)
    }
}

/// Binds a stored registry to its ecosystem for adapter construction.
pub fn registry_handle(registry: &Registry) -> SyncResult<RegistryHandle> {
    let ecosystem: Ecosystem = registry.ecosystem.parse().map_err(|_| {
        SyncError::UnsupportedEcosystem {
            registry: registry.name.clone(),
            ecosystem: registry.ecosystem.clone(),
        }
    })?;

    Ok(RegistryHandle {
        id: registry.id,
        name: registry.name.clone(),
        url: registry.url.clone(),
        ecosystem,
    })
}

#[cfg(test)]
mod tests {
    use pkgsync_config::registry::RegistryConfig;

    use super::*;

    fn config() -> Config {
        let mut config = Config::default_config();
        config.registries = vec![RegistryConfig {
            name: "bower.io".into(),
            url: "https://registry.bower.io".into(),
            ecosystem: Ecosystem::Bower,
        }];
        config
    }

    #[test]
    fn test_seed_registries_is_idempotent() {
        let ctx = SyncContext::in_memory(config()).unwrap();
        ctx.seed_registries().unwrap();

        let registries = ctx.registries().unwrap();
        assert_eq!(registries.len(), 1);
        assert_eq!(registries[0].ecosystem, "bower");
        assert!(ctx.registry_by_name("bower.io").is_ok());
        assert!(matches!(
            ctx.registry_by_name("npmjs.org"),
            Err(SyncError::UnknownRegistry(_))
        ));
    }

    #[test]
    fn test_registry_handle_rejects_unknown_ecosystem() {
        let registry = Registry {
            id: 1,
            name: "weird".into(),
            url: "https://example.com".into(),
            ecosystem: "cobol".into(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!(matches!(
            registry_handle(&registry),
            Err(SyncError::UnsupportedEcosystem { .. })
        ));

        let handle = registry_handle(&Registry {
            ecosystem: "docker".into(),
            ..registry
        })
        .unwrap();
        assert_eq!(handle.ecosystem, Ecosystem::Docker);
    }
}
