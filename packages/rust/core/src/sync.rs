//! Sync orchestration: mirror → index build → publish.
//!
//! All git and filesystem work runs on the blocking pool. The mirror sits
//! behind an async mutex whose owned guard travels into the blocking task,
//! so a pull and the index build that follows it hold the working copy
//! exclusively, and a timed-out pull that is still unwinding keeps later
//! ticks out until it finishes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use gitblog_shared::{BlogError, BlogSettings, ContentSnapshot, Result};

use crate::index::ContentIndexBuilder;
use crate::mirror::{MirrorState, RepositoryMirror, SyncOutcome};
use crate::store::ContentStore;

/// Floor for the scheduled pull period.
const MIN_PULL_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// SyncService
// ---------------------------------------------------------------------------

/// Owns the mirror, the index builder and the published snapshot.
#[derive(Debug)]
pub struct SyncService {
    settings: Arc<BlogSettings>,
    mirror: Arc<Mutex<RepositoryMirror>>,
    builder: Arc<ContentIndexBuilder>,
    store: Arc<ContentStore>,
}

impl SyncService {
    /// Bring the mirror up and publish the first snapshot.
    ///
    /// Never fails on git errors: without a working copy the service starts
    /// with an empty snapshot and the next sync retries the clone.
    #[instrument(skip_all, fields(url = %settings.clone.url))]
    pub async fn start(settings: Arc<BlogSettings>) -> Result<Self> {
        let mut mirror = RepositoryMirror::new(&settings.clone);
        let builder = Arc::new(ContentIndexBuilder::new(
            settings.title.clone(),
            settings.content.clone(),
        ));

        let task_builder = Arc::clone(&builder);
        let (mirror, snapshot) = tokio::task::spawn_blocking(move || {
            if let Err(e) = mirror.ensure_ready() {
                warn!(
                    error = %e,
                    "initial clone failed; serving empty content until a sync succeeds"
                );
            }
            let snapshot = initial_snapshot(&mirror, &task_builder);
            (mirror, snapshot)
        })
        .await
        .map_err(|e| BlogError::mirror(format!("startup sync task failed: {e}")))?;

        info!(
            state = ?mirror.state(),
            entries = snapshot.entry_count(),
            pages = snapshot.page_count(),
            "sync service started"
        );

        Ok(Self {
            settings,
            mirror: Arc::new(Mutex::new(mirror)),
            builder,
            store: Arc::new(ContentStore::new(snapshot)),
        })
    }

    pub fn settings(&self) -> &BlogSettings {
        &self.settings
    }

    /// Shared handle to the published snapshot.
    pub fn store(&self) -> Arc<ContentStore> {
        Arc::clone(&self.store)
    }

    /// The snapshot currently being served.
    pub fn snapshot(&self) -> Arc<ContentSnapshot> {
        self.store.load()
    }

    /// Mirror state; reports `Pulling` while a sync holds the working copy.
    pub fn mirror_state(&self) -> MirrorState {
        match self.mirror.try_lock() {
            Ok(mirror) => mirror.state(),
            Err(_) => MirrorState::Pulling,
        }
    }

    pub async fn last_revision(&self) -> Option<String> {
        self.mirror.lock().await.last_revision().map(str::to_string)
    }

    /// One sync cycle. Returns `Skipped` if another cycle is in flight.
    ///
    /// The pull and the index build run together on the blocking pool, so a
    /// pull that lands after `clone.pull-timeout` has expired still
    /// publishes once it finishes, even though this call already returned
    /// [`BlogError::Timeout`]. A failed build keeps the previous snapshot and
    /// is retried on the next cycle. On error nothing changes.
    #[instrument(skip(self))]
    pub async fn sync_once(&self) -> Result<SyncOutcome> {
        let Ok(mut guard) = Arc::clone(&self.mirror).try_lock_owned() else {
            debug!("sync already in flight, skipping");
            return Ok(SyncOutcome::Skipped);
        };

        let timeout = self.settings.clone.pull_timeout;
        let builder = Arc::clone(&self.builder);
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || -> Result<SyncOutcome> {
            let outcome = guard.sync()?;
            publish_if_stale(&guard, &builder, &store, &outcome);
            Ok(outcome)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(BlogError::mirror(format!("sync task failed: {e}"))),
            Err(_) => {
                warn!(?timeout, "sync still running past its deadline");
                Err(BlogError::Timeout(timeout))
            }
        }
    }

    /// Run [`sync_once`](Self::sync_once) every `clone.pull-update-interval`
    /// until the returned handle is shut down or dropped.
    pub fn spawn_scheduler(self: &Arc<Self>) -> SchedulerHandle {
        let service = Arc::clone(self);
        let period = service
            .settings
            .clone
            .pull_update_interval
            .max(MIN_PULL_INTERVAL);
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(?period, "pull scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => service.run_scheduled().await,
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("pull scheduler stopped");
        });

        SchedulerHandle { shutdown, task }
    }

    async fn run_scheduled(&self) {
        match self.sync_once().await {
            Ok(SyncOutcome::Updated { revision, sequence }) => {
                info!(%revision, sequence, "scheduled sync published new content");
            }
            Ok(SyncOutcome::Unchanged) => debug!("scheduled sync: nothing new"),
            Ok(SyncOutcome::Skipped) => {
                debug!("scheduled sync skipped: previous sync still running");
            }
            Err(e) => warn!(error = %e, "scheduled sync failed; keeping previous snapshot"),
        }
    }
}

/// Build and publish when the working copy moved, or when the published
/// snapshot lags it (an earlier build failed).
fn publish_if_stale(
    mirror: &RepositoryMirror,
    builder: &ContentIndexBuilder,
    store: &ContentStore,
    outcome: &SyncOutcome,
) {
    let sequence = match outcome {
        SyncOutcome::Updated { sequence, .. } => *sequence,
        _ if store.load().revision.as_deref() != mirror.last_revision() => {
            debug!(
                revision = ?mirror.last_revision(),
                "published snapshot is behind the working copy"
            );
            mirror.sequence()
        }
        _ => return,
    };

    match builder.build(mirror.path(), sequence) {
        Ok(snapshot) => {
            store.publish(snapshot);
        }
        Err(e) => {
            warn!(error = %e, sequence, "index build failed; keeping previous snapshot");
        }
    }
}

fn initial_snapshot(mirror: &RepositoryMirror, builder: &ContentIndexBuilder) -> ContentSnapshot {
    if !mirror.has_working_copy() {
        return builder.empty(mirror.sequence());
    }
    match builder.build(mirror.path(), mirror.sequence()) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "initial index build failed; serving empty content");
            builder.empty(mirror.sequence())
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler handle
// ---------------------------------------------------------------------------

/// Stops the background pull loop.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop and wait for it to exit. An in-flight sync finishes
    /// first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "pull scheduler task ended abnormally");
        }
    }
}
