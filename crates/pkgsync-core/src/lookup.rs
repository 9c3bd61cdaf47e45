//! Read-side queries over the store, with sync-on-miss.

use std::sync::Arc;

use pkgsync_db::{
    models::{Package, Registry},
    repository::{PackageRepository, RegistryRepository},
};
use pkgsync_registry::Ecosystem;
use tracing::{debug, info, warn};

use crate::{
    context::{registry_handle, SyncContext},
    error::SyncResult,
    events::SyncEvent,
    queue::{Lane, Task, TaskQueue},
};

/// Packages sharing a repository URL that one `ping_repository` call or
/// repository lookup reaches.
pub const PING_REPOSITORY_LIMIT: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupQuery {
    Name {
        name: String,
    },
    Ecosystem {
        ecosystem: String,
        name: String,
    },
    Purl {
        purl_type: String,
        namespace: Option<String>,
        name: String,
    },
    /// Every stored package whose repository URL matches exactly.
    RepositoryUrl {
        url: String,
    },
}

impl LookupQuery {
    /// Whether an empty result enqueues a sync for the name.
    pub fn fills_on_miss(&self) -> bool {
        matches!(self, Self::Ecosystem { .. } | Self::Purl { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PingOutcome {
    /// The stored package was queued for a sync.
    Known(Package),
    /// The name is not stored yet; the sync decides whether it exists.
    Unknown,
}

pub struct Lookup {
    ctx: SyncContext,
    queue: Arc<dyn TaskQueue>,
}

impl Lookup {
    pub fn new(ctx: SyncContext, queue: Arc<dyn TaskQueue>) -> Self {
        Self { ctx, queue }
    }

    /// Queries the store. An empty result for an ecosystem-scoped query
    /// enqueues a critical sync for that name and is returned unchanged.
    /// Name-only and repository URL queries never enqueue.
    pub fn lookup(&self, query: &LookupQuery) -> SyncResult<Vec<Package>> {
        let (ecosystem, name) = match query {
            LookupQuery::Name { name } => {
                return Ok(self
                    .ctx
                    .db()
                    .with_conn(|conn| PackageRepository::find_all_by_name(conn, name, None))?);
            }
            LookupQuery::RepositoryUrl { url } => {
                return Ok(self.ctx.db().with_conn(|conn| {
                    PackageRepository::find_by_repository_url(conn, url, PING_REPOSITORY_LIMIT)
                })?);
            }
            LookupQuery::Ecosystem { ecosystem, name } => {
                match ecosystem.parse::<Ecosystem>() {
                    Ok(ecosystem) => (ecosystem, ecosystem.canonical_name(name)),
                    Err(_) => {
                        debug!(ecosystem, "lookup for unsupported ecosystem");
                        return Ok(Vec::new());
                    }
                }
            }
            LookupQuery::Purl {
                purl_type,
                namespace,
                name,
            } => {
                let Some(ecosystem) = Ecosystem::from_purl_type(purl_type) else {
                    debug!(purl_type, "lookup for unsupported purl type");
                    return Ok(Vec::new());
                };
                let name = ecosystem.name_from_purl(namespace.as_deref(), name);
                (ecosystem, ecosystem.canonical_name(&name))
            }
        };

        let packages = self.ctx.db().with_conn(|conn| {
            PackageRepository::find_all_by_name(conn, &name, Some(ecosystem.as_str()))
        })?;
        if packages.is_empty() {
            self.fill_on_miss(ecosystem, &name);
        }
        Ok(packages)
    }

    fn fill_on_miss(&self, ecosystem: Ecosystem, name: &str) {
        let registry = match self
            .ctx
            .db()
            .with_conn(|conn| RegistryRepository::find_by_ecosystem(conn, ecosystem.as_str()))
        {
            Ok(Some(registry)) => registry,
            Ok(None) => {
                debug!(%ecosystem, "no registry to fill lookup miss");
                return;
            }
            Err(err) => {
                warn!(%ecosystem, "failed to resolve registry for lookup miss: {err}");
                return;
            }
        };

        let task = Task::SyncPackage {
            registry_id: registry.id,
            name: name.to_string(),
        };
        match self.queue.enqueue(Lane::Critical, task) {
            Ok(_) => {
                debug!(registry = %registry.name, package = name, "enqueued sync for lookup miss");
                self.ctx.emit(SyncEvent::TasksEnqueued {
                    lane: Lane::Critical,
                    count: 1,
                });
            }
            Err(err) => warn!(package = name, "failed to enqueue sync for lookup miss: {err}"),
        }
    }

    /// Finds a package in one registry, trying the exact name first and then
    /// the ecosystem's canonical, lowercase and normalized forms.
    pub fn find_in_registry(&self, registry_name: &str, name: &str) -> SyncResult<Option<Package>> {
        let registry = self.ctx.registry_by_name(registry_name)?;
        let ecosystem = registry_handle(&registry)?.ecosystem;
        self.find_stored(&registry, ecosystem, name)
    }

    fn find_stored(
        &self,
        registry: &Registry,
        ecosystem: Ecosystem,
        name: &str,
    ) -> SyncResult<Option<Package>> {
        let package = self.ctx.db().with_conn(|conn| {
            let candidates = [
                name.to_string(),
                ecosystem.canonical_name(name),
                name.to_lowercase(),
            ];
            for candidate in candidates {
                if let Some(package) = PackageRepository::find_by_name(conn, registry.id, &candidate)? {
                    return Ok(Some(package));
                }
            }
            PackageRepository::find_by_normalized_name(
                conn,
                registry.id,
                &ecosystem.normalize_name(name),
            )
        })?;
        Ok(package)
    }

    /// Queues a critical sync of `name` on the named registry.
    ///
    /// The name resolves the way [`Lookup::find_in_registry`] does, so
    /// `redis` on a docker registry pings the stored `library/redis`. An
    /// unknown name is queued in its canonical form.
    pub fn ping(&self, registry_name: &str, name: &str) -> SyncResult<PingOutcome> {
        let registry = self.ctx.registry_by_name(registry_name)?;
        let ecosystem = registry_handle(&registry)?.ecosystem;
        let known = self.find_stored(&registry, ecosystem, name)?;

        let target = known
            .as_ref()
            .map(|package| package.name.clone())
            .unwrap_or_else(|| ecosystem.canonical_name(name));
        info!(registry = %registry.name, package = target.as_str(), known = known.is_some(), "ping");
        self.queue.enqueue(
            Lane::Critical,
            Task::SyncPackage {
                registry_id: registry.id,
                name: target,
            },
        )?;

        Ok(match known {
            Some(package) => PingOutcome::Known(package),
            None => PingOutcome::Unknown,
        })
    }

    /// Queues critical syncs for the packages sharing a repository URL.
    pub fn ping_repository(&self, repository_url: &str) -> SyncResult<usize> {
        let packages = self.ctx.db().with_conn(|conn| {
            PackageRepository::find_by_repository_url(conn, repository_url, PING_REPOSITORY_LIMIT)
        })?;
        let tasks = packages
            .into_iter()
            .map(|package| {
                Task::SyncPackage {
                    registry_id: package.registry_id,
                    name: package.name,
                }
            })
            .collect();

        let count = self.queue.enqueue_bulk(Lane::Critical, tasks)?;
        self.ctx.emit(SyncEvent::TasksEnqueued {
            lane: Lane::Critical,
            count,
        });
        Ok(count)
    }
}
