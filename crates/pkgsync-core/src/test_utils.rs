use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc::Receiver,
        Arc, Mutex, MutexGuard,
    },
};

use chrono::{TimeZone, Utc};
use pkgsync_config::{config::Config, registry::RegistryConfig};
use pkgsync_db::Database;
use pkgsync_registry::{
    DependencyMetadata, Ecosystem, EcosystemAdapter, PackageMetadata, RegistryError,
    RegistryHandle, VersionMetadata,
};
use serde_json::{json, Value};

use crate::{
    context::{registry_handle, SyncContext},
    error::{SyncError, SyncResult},
    events::CollectorSink,
    queue::{Lane, Task, TaskQueue},
    repo_metadata::RepoMetadataProvider,
};

pub fn test_config() -> Config {
    let mut config = Config::default_config();
    config.registries = vec![
        RegistryConfig {
            name: "bower.io".into(),
            url: "https://registry.bower.io".into(),
            ecosystem: Ecosystem::Bower,
        },
        RegistryConfig {
            name: "hub.docker.com".into(),
            url: "https://registry.hub.docker.com".into(),
            ecosystem: Ecosystem::Docker,
        },
    ];
    config
}

pub fn test_context_with(config: Config) -> (SyncContext, Arc<CollectorSink>) {
    let events = Arc::new(CollectorSink::default());
    let ctx = SyncContext::new(config, Database::open_in_memory().unwrap(), events.clone());
    ctx.seed_registries().unwrap();
    (ctx, events)
}

pub fn test_context() -> (SyncContext, Arc<CollectorSink>) {
    test_context_with(test_config())
}

pub fn handle_for(ctx: &SyncContext, registry: &str) -> RegistryHandle {
    registry_handle(&ctx.registry_by_name(registry).unwrap()).unwrap()
}

#[derive(Default)]
pub struct ScriptedPackage {
    pub meta: PackageMetadata,
    pub versions: Vec<VersionMetadata>,
    pub dependencies: HashMap<String, Vec<DependencyMetadata>>,
}

#[derive(Default)]
pub struct Script {
    pub packages: BTreeMap<String, ScriptedPackage>,
    pub recent: Vec<String>,
    /// Names whose metadata fetch fails.
    pub failing: HashSet<String>,
    /// Names whose version listing fails.
    pub failing_versions: HashSet<String>,
    /// `name@version` of every dependency fetch, in call order.
    pub dependency_calls: Vec<String>,
}

/// In-memory adapter whose upstream is edited between syncs.
pub struct ScriptedAdapter {
    registry: RegistryHandle,
    script: Mutex<Script>,
}

impl ScriptedAdapter {
    pub fn new(registry: RegistryHandle) -> Self {
        Self {
            registry,
            script: Mutex::new(Script::default()),
        }
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn add_package(&self, name: &str, versions: &[&str]) {
        let mut script = self.script();
        let package = script.packages.entry(name.to_string()).or_default();
        package.meta = PackageMetadata {
            name: name.to_string(),
            repository_url: Some(format!("https://github.com/acme/{name}")),
            licenses: Some("MIT".into()),
            keywords: vec!["ui".into()],
            description: Some(format!("{name} package")),
            metadata: json!({}),
            ..Default::default()
        };
        for number in versions {
            if !package.versions.iter().any(|v| v.number == *number) {
                package.versions.push(VersionMetadata::new(*number));
            }
        }
    }

    pub fn add_published_version(&self, name: &str, number: &str, day: u32) {
        let mut script = self.script();
        if let Some(package) = script.packages.get_mut(name) {
            let mut version = VersionMetadata::new(number);
            version.published_at = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).single();
            package.versions.push(version);
        }
    }

    pub fn set_dependencies(&self, name: &str, version: &str, deps: &[(&str, &str)]) {
        let ecosystem = self.registry.ecosystem;
        let mut script = self.script();
        if let Some(package) = script.packages.get_mut(name) {
            package.dependencies.insert(
                version.to_string(),
                deps.iter()
                    .map(|(dep, requirements)| {
                        DependencyMetadata {
                            package_name: dep.to_string(),
                            requirements: requirements.to_string(),
                            kind: "runtime".into(),
                            optional: false,
                            ecosystem,
                        }
                    })
                    .collect(),
            );
        }
    }

    pub fn dependency_calls(&self) -> Vec<String> {
        self.script().dependency_calls.clone()
    }
}

impl EcosystemAdapter for ScriptedAdapter {
    fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    fn all_package_names(&self) -> pkgsync_registry::Result<Vec<String>> {
        Ok(self.script().packages.keys().cloned().collect())
    }

    fn recently_updated_package_names(&self) -> pkgsync_registry::Result<Vec<String>> {
        Ok(self.script().recent.clone())
    }

    fn package_metadata(&self, name: &str) -> pkgsync_registry::Result<Option<PackageMetadata>> {
        let name = self.ecosystem().canonical_name(name);
        let script = self.script();
        if script.failing.contains(&name) {
            return Err(RegistryError::FailedToFetchRemote(format!("{name}: 500")));
        }
        Ok(script.packages.get(&name).map(|p| p.meta.clone()))
    }

    fn versions_metadata(
        &self,
        package: &PackageMetadata,
    ) -> pkgsync_registry::Result<Vec<VersionMetadata>> {
        let script = self.script();
        if script.failing_versions.contains(&package.name) {
            return Err(RegistryError::FailedToFetchRemote(format!(
                "{} versions: 500",
                package.name
            )));
        }
        Ok(script
            .packages
            .get(&package.name)
            .map(|p| p.versions.clone())
            .unwrap_or_default())
    }

    fn dependencies_metadata(
        &self,
        name: &str,
        version: &str,
        _package: &PackageMetadata,
    ) -> Vec<DependencyMetadata> {
        let mut script = self.script();
        script.dependency_calls.push(format!("{name}@{version}"));
        script
            .packages
            .get(name)
            .and_then(|p| p.dependencies.get(version).cloned())
            .unwrap_or_default()
    }
}

/// Queue that records what was enqueued and runs nothing.
#[derive(Default)]
pub struct RecordingQueue {
    tasks: Mutex<Vec<(Lane, Task)>>,
    pub bulk_calls: AtomicUsize,
    pub closed: AtomicBool,
}

impl RecordingQueue {
    pub fn tasks(&self) -> Vec<(Lane, Task)> {
        self.tasks.lock().unwrap().clone()
    }
}

impl TaskQueue for RecordingQueue {
    fn enqueue(&self, lane: Lane, task: Task) -> SyncResult<bool> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SyncError::QueueClosed);
        }
        self.tasks.lock().unwrap().push((lane, task));
        Ok(true)
    }

    fn enqueue_bulk(&self, lane: Lane, tasks: Vec<Task>) -> SyncResult<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SyncError::QueueClosed);
        }
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        let count = tasks.len();
        self.tasks
            .lock()
            .unwrap()
            .extend(tasks.into_iter().map(|task| (lane, task)));
        Ok(count)
    }
}

/// Repository metadata provider returning a fixed document.
pub struct StubProvider {
    pub value: Value,
    pub calls: AtomicUsize,
    /// When set, each fetch blocks until a message arrives.
    pub gate: Option<Mutex<Receiver<()>>>,
}

impl StubProvider {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }
}

impl RepoMetadataProvider for StubProvider {
    fn fetch(&self, _repository_url: &str) -> SyncResult<Option<Value>> {
        if let Some(gate) = &self.gate {
            let _ = gate.lock().unwrap().recv();
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.value.clone()))
    }
}
