use std::{
    collections::HashMap,
    sync::{mpsc::Receiver, Arc, LazyLock},
    time::Duration,
};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use nu_ansi_term::Color::{Cyan, Green, Red};
use pkgsync_core::events::SyncEvent;

use crate::utils::Colored;

/// Shared MultiProgress instance for suspend/stop from other modules.
static MULTI: LazyLock<Arc<MultiProgress>> = LazyLock::new(|| Arc::new(MultiProgress::new()));

/// Pause progress display, run the closure, then resume.
pub fn suspend<F: FnOnce()>(f: F) {
    MULTI.suspend(f);
}

/// Stop and clear all progress bars.
pub fn stop() {
    MULTI.clear().ok();
}

/// Owns the background thread rendering progress.
///
/// The context holding the channel sender must be dropped before calling
/// [`finish`](ProgressGuard::finish), otherwise the thread waits forever.
pub struct ProgressGuard {
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ProgressGuard {
    pub fn finish(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

fn batch_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {prefix}  {wide_bar:.cyan/dim}  {pos}/{len}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━─")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

#[derive(Default)]
struct Tally {
    synced: usize,
    not_found: usize,
    failed: usize,
}

impl Tally {
    fn message(&self) -> String {
        format!(
            "{} synced, {} not found, {} failed",
            Colored(Green, self.synced),
            self.not_found,
            Colored(Red, self.failed)
        )
    }
}

/// Spawns a thread that renders [`SyncEvent`]s: one bar per registry for
/// inline batches, and a single spinner tallying worker pool results.
pub fn spawn_event_handler(receiver: Receiver<SyncEvent>) -> ProgressGuard {
    let handle = std::thread::spawn(move || {
        let mut batches: HashMap<String, ProgressBar> = HashMap::new();
        let mut worker: Option<ProgressBar> = None;
        let mut tally = Tally::default();

        let worker_spinner = |worker: &mut Option<ProgressBar>| -> ProgressBar {
            worker
                .get_or_insert_with(|| {
                    let pb = MULTI.add(ProgressBar::new_spinner());
                    pb.set_style(spinner_style());
                    pb.enable_steady_tick(Duration::from_millis(100));
                    pb
                })
                .clone()
        };

        while let Ok(event) = receiver.recv() {
            match event {
                SyncEvent::BatchProgress {
                    registry,
                    completed,
                    total,
                    failed,
                } => {
                    let pb = batches.entry(registry.clone()).or_insert_with(|| {
                        let pb = MULTI.add(ProgressBar::new(total as u64));
                        pb.set_style(batch_style());
                        pb.set_prefix(format!("{}", Colored(Cyan, &registry)));
                        pb.enable_steady_tick(Duration::from_millis(100));
                        pb
                    });
                    pb.set_position(completed as u64);
                    pb.set_message(format!("{} failed", Colored(Red, failed)));
                    if completed >= total {
                        pb.finish_and_clear();
                        batches.remove(&registry);
                    }
                }
                SyncEvent::PackageSynced { registry, name, .. } => {
                    if batches.is_empty() {
                        tally.synced += 1;
                        let pb = worker_spinner(&mut worker);
                        pb.set_message(format!("{} | {registry}: {name}", tally.message()));
                    }
                }
                SyncEvent::PackageNotFound { .. } => {
                    if batches.is_empty() {
                        tally.not_found += 1;
                        worker_spinner(&mut worker).set_message(tally.message());
                    }
                }
                SyncEvent::PackageFailed { .. } => {
                    if batches.is_empty() {
                        tally.failed += 1;
                        worker_spinner(&mut worker).set_message(tally.message());
                    }
                }
                SyncEvent::TasksEnqueued { .. } => {}
            }
        }

        for (_, pb) in batches.drain() {
            pb.finish_and_clear();
        }
        if let Some(pb) = worker.take() {
            pb.finish_and_clear();
        }
    });

    ProgressGuard {
        handle: Some(handle),
    }
}
