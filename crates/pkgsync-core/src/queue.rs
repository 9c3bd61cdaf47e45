//! Priority-lane task queue and the in-process worker pool draining it.

use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use pkgsync_utils::time::RefreshInterval;
use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot, Notify, Semaphore},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, error, info, warn};

use crate::{
    adapters::AdapterCache,
    context::{registry_handle, SyncContext},
    error::{SyncError, SyncResult},
    events::SyncEvent,
    repo_metadata::{
        refresh_repo_metadata, repo_metadata_due, RepoMetadataProvider, ReposServiceClient,
    },
    sync::{SyncEngine, SyncOutcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    /// On-demand work: lookup misses and pings.
    Critical,
    /// Bulk and background syncs.
    Low,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Critical => write!(f, "critical"),
            Lane::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    SyncPackage { registry_id: i32, name: String },
    RefreshRepoMetadata { package_id: i32 },
}

impl Task {
    /// Key for tasks that may have at most one queued or running instance.
    fn unique_key(&self) -> Option<i32> {
        match self {
            Task::RefreshRepoMetadata { package_id } => Some(*package_id),
            Task::SyncPackage { .. } => None,
        }
    }
}

pub trait TaskQueue: Send + Sync {
    /// Returns `false` when the task was dropped as a duplicate.
    fn enqueue(&self, lane: Lane, task: Task) -> SyncResult<bool>;

    /// Enqueues all tasks in one call, returning how many were accepted.
    fn enqueue_bulk(&self, lane: Lane, tasks: Vec<Task>) -> SyncResult<usize> {
        let mut accepted = 0;
        for task in tasks {
            if self.enqueue(lane, task)? {
                accepted += 1;
            }
        }
        Ok(accepted)
    }
}

struct QueueShared {
    critical: mpsc::UnboundedSender<Task>,
    low: mpsc::UnboundedSender<Task>,
    unique: Mutex<HashSet<i32>>,
    pending: AtomicUsize,
    idle: Notify,
    closed: AtomicBool,
}

/// Sending side of the worker pool's lanes.
#[derive(Clone)]
pub struct QueueHandle {
    shared: Arc<QueueShared>,
}

impl QueueHandle {
    /// Tasks queued or running.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Resolves once no task is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    fn send(&self, lane: Lane, task: Task) -> SyncResult<bool> {
        if let Some(key) = task.unique_key() {
            let mut unique = self
                .shared
                .unique
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !unique.insert(key) {
                debug!(?task, "dropping duplicate task");
                return Ok(false);
            }
        }

        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        let sender = match lane {
            Lane::Critical => &self.shared.critical,
            Lane::Low => &self.shared.low,
        };
        if let Err(mpsc::error::SendError(task)) = sender.send(task) {
            self.finish(&task);
            return Err(SyncError::QueueClosed);
        }
        Ok(true)
    }

    fn finish(&self, task: &Task) {
        if let Some(key) = task.unique_key() {
            self.shared
                .unique
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&key);
        }
        if self.shared.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.idle.notify_waiters();
        }
    }
}

impl TaskQueue for QueueHandle {
    fn enqueue(&self, lane: Lane, task: Task) -> SyncResult<bool> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(SyncError::QueueClosed);
        }
        self.send(lane, task)
    }

    fn enqueue_bulk(&self, lane: Lane, tasks: Vec<Task>) -> SyncResult<usize> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(SyncError::QueueClosed);
        }
        let mut accepted = 0;
        for task in tasks {
            if self.send(lane, task)? {
                accepted += 1;
            }
        }
        debug!(%lane, accepted, "bulk enqueue");
        Ok(accepted)
    }
}

/// Executes a single task. Shared by every worker.
pub struct TaskRunner {
    engine: SyncEngine,
    adapters: AdapterCache,
    repo_metadata: Arc<dyn RepoMetadataProvider>,
    repo_metadata_interval: RefreshInterval,
}

impl TaskRunner {
    pub fn new(ctx: SyncContext) -> SyncResult<Self> {
        let config = ctx.config();
        let adapters = AdapterCache::new(config.adapter_refresh_interval()?);
        let repo_metadata = Arc::new(ReposServiceClient::new(config.repos_api()));
        let repo_metadata_interval = config.repo_metadata_interval()?;
        Ok(Self {
            engine: SyncEngine::new(ctx),
            adapters,
            repo_metadata,
            repo_metadata_interval,
        })
    }

    pub fn with_adapters(mut self, adapters: AdapterCache) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_repo_metadata(mut self, provider: Arc<dyn RepoMetadataProvider>) -> Self {
        self.repo_metadata = provider;
        self
    }

    pub fn adapters(&self) -> &AdapterCache {
        &self.adapters
    }

    pub fn context(&self) -> &SyncContext {
        self.engine.context()
    }

    /// Runs `task`, using `queue` for any follow-up work.
    pub fn run(&self, task: Task, queue: &dyn TaskQueue) -> SyncResult<()> {
        match task {
            Task::SyncPackage { registry_id, name } => self.sync_package(registry_id, &name, queue),
            Task::RefreshRepoMetadata { package_id } => {
                refresh_repo_metadata(self.context(), self.repo_metadata.as_ref(), package_id)?;
                Ok(())
            }
        }
    }

    fn sync_package(&self, registry_id: i32, name: &str, queue: &dyn TaskQueue) -> SyncResult<()> {
        let ctx = self.context();
        let Some(registry) = ctx.registry_by_id(registry_id)? else {
            warn!(registry_id, package = name, "registry no longer exists, skipping");
            return Ok(());
        };
        let adapter = self.adapters.get(&registry_handle(&registry)?);

        match self.engine.sync_package(adapter.as_ref(), name) {
            Ok(SyncOutcome::Synced(synced)) => {
                ctx.emit(SyncEvent::PackageSynced {
                    registry: registry.name.clone(),
                    name: synced.package.name.clone(),
                    new_versions: synced.new_versions,
                    new_dependencies: synced.new_dependencies,
                });
                if repo_metadata_due(&synced.package, self.repo_metadata_interval) {
                    let task = Task::RefreshRepoMetadata {
                        package_id: synced.package.id,
                    };
                    if let Err(err) = queue.enqueue(Lane::Low, task) {
                        warn!(package = name, "failed to enqueue repository metadata refresh: {err}");
                    }
                }
                Ok(())
            }
            Ok(SyncOutcome::NotFound) => {
                ctx.emit(SyncEvent::PackageNotFound {
                    registry: registry.name,
                    name: name.to_string(),
                });
                Ok(())
            }
            Err(err) => {
                ctx.emit(SyncEvent::PackageFailed {
                    registry: registry.name,
                    name: name.to_string(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

/// Tokio-driven pool that drains the critical lane before the low lane and
/// runs up to `workers` blocking tasks at once.
pub struct WorkerPool {
    handle: QueueHandle,
    shutdown: Option<oneshot::Sender<()>>,
    dispatcher: JoinHandle<()>,
}

impl WorkerPool {
    /// Must be called from within a tokio runtime.
    pub fn start(runner: Arc<TaskRunner>, workers: usize) -> (Self, QueueHandle) {
        let (critical_tx, critical_rx) = mpsc::unbounded_channel();
        let (low_tx, low_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = QueueHandle {
            shared: Arc::new(QueueShared {
                critical: critical_tx,
                low: low_tx,
                unique: Mutex::new(HashSet::new()),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        };

        let dispatcher = tokio::spawn(dispatch_loop(
            critical_rx,
            low_rx,
            shutdown_rx,
            runner,
            handle.clone(),
            workers.max(1),
        ));

        info!(workers, "worker pool started");
        let pool = Self {
            handle: handle.clone(),
            shutdown: Some(shutdown_tx),
            dispatcher,
        };
        (pool, handle)
    }

    /// Starts a pool sized by the configured worker count.
    pub fn spawn(ctx: SyncContext) -> SyncResult<(Self, QueueHandle)> {
        let workers = ctx.config().workers();
        let runner = TaskRunner::new(ctx)?;
        Ok(Self::start(Arc::new(runner), workers))
    }

    pub fn handle(&self) -> &QueueHandle {
        &self.handle
    }

    /// Runs until every queued task, including follow-ups, has finished.
    pub async fn drain(&self) {
        self.handle.wait_idle().await;
    }

    /// Stops accepting work, drops what is still queued and waits for running tasks.
    pub async fn shutdown(mut self) {
        self.handle.close();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = self.dispatcher.await {
            error!("worker pool dispatcher failed: {err}");
        }
        info!("worker pool stopped");
    }
}

async fn dispatch_loop(
    mut critical: mpsc::UnboundedReceiver<Task>,
    mut low: mpsc::UnboundedReceiver<Task>,
    mut shutdown: oneshot::Receiver<()>,
    runner: Arc<TaskRunner>,
    handle: QueueHandle,
    workers: usize,
) {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut running = JoinSet::new();

    loop {
        let permit = tokio::select! {
            _ = &mut shutdown => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let task = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            Some(task) = critical.recv() => task,
            Some(task) = low.recv() => task,
            else => break,
        };

        let runner = runner.clone();
        let handle = handle.clone();
        running.spawn(async move {
            let _permit = permit;
            let queue = handle.clone();
            let finished = task.clone();
            let result = tokio::task::spawn_blocking(move || runner.run(task, &queue)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(task = ?finished, "task failed: {err}"),
                Err(err) => error!(task = ?finished, "task panicked: {err}"),
            }
            handle.finish(&finished);
        });

        while running.try_join_next().is_some() {}
    }

    let dropped = drain_receiver(&mut critical, &handle) + drain_receiver(&mut low, &handle);
    if dropped > 0 {
        warn!(dropped, "discarded queued tasks on shutdown");
    }
    while running.join_next().await.is_some() {}
}

fn drain_receiver(receiver: &mut mpsc::UnboundedReceiver<Task>, handle: &QueueHandle) -> usize {
    receiver.close();
    let mut dropped = 0;
    while let Ok(task) = receiver.try_recv() {
        handle.finish(&task);
        dropped += 1;
    }
    dropped
}
