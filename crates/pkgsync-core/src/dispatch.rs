use std::{collections::HashSet, sync::Arc};

use pkgsync_db::repository::PackageRepository;
use pkgsync_registry::EcosystemAdapter;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    adapters::AdapterCache,
    context::{registry_handle, SyncContext},
    error::{SyncError, SyncResult},
    events::SyncEvent,
    queue::{Lane, Task, TaskQueue},
    sync::{SyncEngine, SyncOutcome},
};

/// Which upstream names a dispatch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Upstream names not stored yet.
    Missing,
    RecentlyUpdated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Sync every name on the calling thread.
    Inline,
    /// Enqueue one low-lane task per name.
    Background,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub synced: Vec<String>,
    pub not_found: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.synced.len() + self.not_found.len() + self.failed.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Completed(BatchReport),
    Enqueued(usize),
}

/// Chooses the names to sync for a registry and runs or enqueues them.
pub struct Dispatcher {
    engine: SyncEngine,
    queue: Option<Arc<dyn TaskQueue>>,
}

impl Dispatcher {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            engine: SyncEngine::new(ctx),
            queue: None,
        }
    }

    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    fn ctx(&self) -> &SyncContext {
        self.engine.context()
    }

    pub fn missing_package_names(&self, adapter: &dyn EcosystemAdapter) -> SyncResult<Vec<String>> {
        let registry_id = adapter.registry().id;
        let existing: HashSet<String> = self
            .ctx()
            .db()
            .with_conn(|conn| PackageRepository::existing_names(conn, registry_id))?
            .into_iter()
            .collect();

        Ok(adapter
            .all_package_names()?
            .into_iter()
            .filter(|name| !existing.contains(name))
            .collect())
    }

    pub fn target_names(
        &self,
        adapter: &dyn EcosystemAdapter,
        selection: Selection,
    ) -> SyncResult<Vec<String>> {
        let names = match selection {
            Selection::All => adapter.all_package_names()?,
            Selection::Missing => self.missing_package_names(adapter)?,
            Selection::RecentlyUpdated => {
                let limit = self.ctx().config().recently_updated_limit();
                let mut names = adapter.recently_updated_package_names()?;
                names.truncate(limit);
                names
            }
        };
        debug!(
            registry = %adapter.registry().name,
            ?selection,
            count = names.len(),
            "selected package names"
        );
        Ok(names)
    }

    /// Syncs each name in turn. A failing name is recorded and skipped.
    pub fn sync_packages(&self, adapter: &dyn EcosystemAdapter, names: &[String]) -> BatchReport {
        let registry = adapter.registry().name.clone();
        let ecosystem = adapter.ecosystem();
        let total = names.len();
        let mut report = BatchReport::default();

        for (idx, name) in names.iter().enumerate() {
            match self.engine.sync_package(adapter, name) {
                Ok(SyncOutcome::Synced(synced)) => {
                    self.ctx().emit(SyncEvent::PackageSynced {
                        registry: registry.clone(),
                        name: name.clone(),
                        new_versions: synced.new_versions,
                        new_dependencies: synced.new_dependencies,
                    });
                    report.synced.push(name.clone());
                }
                Ok(SyncOutcome::NotFound) => {
                    self.ctx().emit(SyncEvent::PackageNotFound {
                        registry: registry.clone(),
                        name: name.clone(),
                    });
                    report.not_found.push(name.clone());
                }
                Err(err) => {
                    error!(
                        registry = %registry,
                        package = %name,
                        %ecosystem,
                        "error syncing {name} ({ecosystem}): {err}"
                    );
                    self.ctx().emit(SyncEvent::PackageFailed {
                        registry: registry.clone(),
                        name: name.clone(),
                        error: err.to_string(),
                    });
                    report.failed.push((name.clone(), err.to_string()));
                }
            }

            self.ctx().emit(SyncEvent::BatchProgress {
                registry: registry.clone(),
                completed: idx + 1,
                total,
                failed: report.failed.len(),
            });
        }

        info!(
            registry = %registry,
            synced = report.synced.len(),
            not_found = report.not_found.len(),
            failed = report.failed.len(),
            "batch sync finished"
        );
        report
    }

    /// Enqueues one low-lane task per name with a single bulk call.
    pub fn sync_packages_async(
        &self,
        adapter: &dyn EcosystemAdapter,
        names: Vec<String>,
    ) -> SyncResult<usize> {
        let queue = self.queue.as_ref().ok_or(SyncError::QueueUnavailable)?;
        let registry_id = adapter.registry().id;
        let tasks = names
            .into_iter()
            .map(|name| Task::SyncPackage { registry_id, name })
            .collect();

        let count = queue.enqueue_bulk(Lane::Low, tasks)?;
        self.ctx().emit(SyncEvent::TasksEnqueued {
            lane: Lane::Low,
            count,
        });
        info!(registry = %adapter.registry().name, count, "enqueued package syncs");
        Ok(count)
    }

    pub fn dispatch(
        &self,
        adapter: &dyn EcosystemAdapter,
        selection: Selection,
        mode: DispatchMode,
    ) -> SyncResult<DispatchResult> {
        let names = self.target_names(adapter, selection)?;
        match mode {
            DispatchMode::Inline => Ok(DispatchResult::Completed(self.sync_packages(adapter, &names))),
            DispatchMode::Background => {
                Ok(DispatchResult::Enqueued(self.sync_packages_async(adapter, names)?))
            }
        }
    }

    pub fn sync_all_packages(&self, adapter: &dyn EcosystemAdapter) -> SyncResult<BatchReport> {
        let names = self.target_names(adapter, Selection::All)?;
        Ok(self.sync_packages(adapter, &names))
    }

    pub fn sync_all_packages_async(&self, adapter: &dyn EcosystemAdapter) -> SyncResult<usize> {
        let names = self.target_names(adapter, Selection::All)?;
        self.sync_packages_async(adapter, names)
    }

    pub fn sync_missing_packages(&self, adapter: &dyn EcosystemAdapter) -> SyncResult<BatchReport> {
        let names = self.target_names(adapter, Selection::Missing)?;
        Ok(self.sync_packages(adapter, &names))
    }

    pub fn sync_missing_packages_async(&self, adapter: &dyn EcosystemAdapter) -> SyncResult<usize> {
        let names = self.target_names(adapter, Selection::Missing)?;
        self.sync_packages_async(adapter, names)
    }

    pub fn sync_recently_updated_packages(
        &self,
        adapter: &dyn EcosystemAdapter,
    ) -> SyncResult<BatchReport> {
        let names = self.target_names(adapter, Selection::RecentlyUpdated)?;
        Ok(self.sync_packages(adapter, &names))
    }

    pub fn sync_recently_updated_packages_async(
        &self,
        adapter: &dyn EcosystemAdapter,
    ) -> SyncResult<usize> {
        let names = self.target_names(adapter, Selection::RecentlyUpdated)?;
        self.sync_packages_async(adapter, names)
    }

    /// Runs the selection for every stored registry. One registry failing
    /// does not stop the others.
    pub fn sync_all_registries(
        &self,
        adapters: &AdapterCache,
        selection: Selection,
        mode: DispatchMode,
    ) -> SyncResult<Vec<(String, SyncResult<DispatchResult>)>> {
        let registries = self.ctx().registries()?;
        let results = registries
            .into_iter()
            .map(|registry| {
                let result = registry_handle(&registry).and_then(|handle| {
                    let adapter = adapters.get(&handle);
                    self.dispatch(adapter.as_ref(), selection, mode)
                });
                if let Err(err) = &result {
                    warn!(registry = %registry.name, "dispatch failed: {err}");
                }
                (registry.name, result)
            })
            .collect();
        Ok(results)
    }
}
