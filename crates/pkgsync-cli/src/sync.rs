use std::sync::Arc;

use nu_ansi_term::Color::{Cyan, Green, Red, Yellow};
use pkgsync_core::{
    context::registry_handle,
    dispatch::{BatchReport, DispatchMode, DispatchResult, Dispatcher, Selection},
    error::SyncResult,
    queue::{QueueHandle, TaskQueue, TaskRunner, WorkerPool},
    sync::{SyncEngine, SyncOutcome},
    SyncContext,
};
use tracing::{debug, error, info, warn};

use crate::utils::{or_dash, Colored, Icons};

/// Starts a worker pool, runs `f` against its queue, then works until every
/// queued task (follow-ups included) has finished.
pub async fn with_worker_pool<F, T>(ctx: &SyncContext, f: F) -> SyncResult<T>
where
    F: FnOnce(&QueueHandle, &TaskRunner) -> SyncResult<T>,
{
    let runner = Arc::new(TaskRunner::new(ctx.clone())?);
    let (pool, queue) = WorkerPool::start(runner.clone(), ctx.config().workers());

    let result = tokio::task::block_in_place(|| f(&queue, &runner));
    if result.is_ok() {
        debug!(pending = queue.pending(), "waiting for the worker pool to drain");
        pool.drain().await;
    }
    pool.shutdown().await;
    result
}

fn log_report(registry: &str, report: &BatchReport) {
    for (name, reason) in &report.failed {
        warn!(registry, package = name.as_str(), "{} {name}: {reason}", Icons::CROSS);
    }
    info!(
        registry,
        synced = report.synced.len(),
        not_found = report.not_found.len(),
        failed = report.failed.len(),
        "{}: {} synced, {} not found, {} failed",
        Colored(Cyan, registry),
        Colored(Green, report.synced.len()),
        Colored(Yellow, report.not_found.len()),
        Colored(Red, report.failed.len()),
    );
}

pub async fn sync_registry(
    ctx: &SyncContext,
    registry: &str,
    selection: Selection,
    background: bool,
) -> SyncResult<()> {
    let handle = registry_handle(&ctx.registry_by_name(registry)?)?;

    if !background {
        let runner = TaskRunner::new(ctx.clone())?;
        let adapter = runner.adapters().get(&handle);
        let result = tokio::task::block_in_place(|| {
            Dispatcher::new(ctx.clone()).dispatch(adapter.as_ref(), selection, DispatchMode::Inline)
        })?;
        if let DispatchResult::Completed(report) = result {
            log_report(registry, &report);
        }
        return Ok(());
    }

    let enqueued = with_worker_pool(ctx, |queue, runner| {
        let adapter = runner.adapters().get(&handle);
        let queue: Arc<dyn TaskQueue> = Arc::new(queue.clone());
        Dispatcher::new(ctx.clone())
            .with_queue(queue)
            .dispatch(adapter.as_ref(), selection, DispatchMode::Background)
    })
    .await?;
    if let DispatchResult::Enqueued(count) = enqueued {
        info!(registry, count, "{} {count} package syncs finished", Icons::QUEUE);
    }
    Ok(())
}

/// Dispatches `selection` for every registry onto the worker pool.
pub async fn sync_all_registries(ctx: &SyncContext, selection: Selection) -> SyncResult<()> {
    let results = with_worker_pool(ctx, |queue, runner| {
        let queue: Arc<dyn TaskQueue> = Arc::new(queue.clone());
        Dispatcher::new(ctx.clone()).with_queue(queue).sync_all_registries(
            runner.adapters(),
            selection,
            DispatchMode::Background,
        )
    })
    .await?;

    for (registry, result) in results {
        match result {
            Ok(DispatchResult::Enqueued(count)) => {
                info!(
                    registry = registry.as_str(),
                    count,
                    "{}: {count} package syncs",
                    Colored(Cyan, &registry)
                );
            }
            Ok(DispatchResult::Completed(report)) => log_report(&registry, &report),
            Err(err) => error!(registry = registry.as_str(), "{}: {err}", Colored(Cyan, &registry)),
        }
    }
    Ok(())
}

pub async fn sync_single_package(ctx: &SyncContext, registry: &str, name: &str) -> SyncResult<()> {
    let handle = registry_handle(&ctx.registry_by_name(registry)?)?;
    let runner = TaskRunner::new(ctx.clone())?;
    let adapter = runner.adapters().get(&handle);

    let outcome = tokio::task::block_in_place(|| {
        SyncEngine::new(ctx.clone()).sync_package(adapter.as_ref(), name)
    })?;

    match outcome {
        SyncOutcome::NotFound => {
            warn!(registry, package = name, "{} {name} not found on {registry}", Icons::CROSS);
        }
        SyncOutcome::Synced(synced) => {
            let package = &synced.package;
            info!(
                registry,
                package = package.name.as_str(),
                new_versions = synced.new_versions,
                new_dependencies = synced.new_dependencies,
                versions_count = package.versions_count,
                latest = package.latest_release_number.as_deref(),
                "{} {} ({} new versions, {} new dependencies, latest {})",
                Icons::CHECK,
                Colored(Cyan, &package.name),
                Colored(Green, synced.new_versions),
                Colored(Green, synced.new_dependencies),
                or_dash(package.latest_release_number.as_deref()),
            );
        }
    }
    Ok(())
}
