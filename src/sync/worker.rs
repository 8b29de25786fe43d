//! Background loop keeping the index in step with the directory.
//!
//! The worker attaches the directory watcher, reconciles once, then on every
//! tick reconciles again and drains the event buffer. Live events give low
//! latency; reconciliation repairs anything the OS dropped or coalesced.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::reconciler::{ReconcileDiff, Reconciler};
use super::synchronizer::{SyncReport, Synchronizer};
use crate::config::Config;
use crate::error::Error;
use crate::observability::metrics;
use crate::storage::VectorIndex;
use crate::watcher::{ChangeFilter, ChangeObserver, DirectoryWatcher, EventBuffer};
use crate::Result;

/// Worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Attaching the watcher and running the initial reconciliation.
    Starting,
    /// Ticking until cancelled.
    Running,
    /// Detaching the watcher.
    Stopping,
    /// Terminal. No further index mutation happens.
    Stopped,
}

impl WorkerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a tick needs, kept apart from the watcher so ticks only
/// borrow shared state.
struct Cycle {
    synchronizer: Arc<Synchronizer>,
    reconciler: Reconciler,
    buffer: Arc<EventBuffer>,
}

impl Cycle {
    async fn diff(&self) -> Result<ReconcileDiff> {
        let reconciler = self.reconciler.clone();
        let index = Arc::clone(self.synchronizer.index());
        tokio::task::spawn_blocking(move || reconciler.diff(index.as_ref()))
            .await
            .map_err(|e| Error::internal(format!("reconcile task failed: {e}")))?
    }

    async fn reconcile(&self) -> Result<SyncReport> {
        let diff = self.diff().await?;
        if diff.is_empty() {
            return Ok(SyncReport::default());
        }
        self.synchronizer.apply_diff(&diff).await
    }

    async fn drain(&self) -> Result<SyncReport> {
        let changes = self.buffer.snapshot_and_clear();
        metrics::PENDING_CHANGES.set(0);
        if changes.is_empty() {
            return Ok(SyncReport::default());
        }
        tracing::debug!(changes = changes.len(), "Applying buffered changes");
        self.synchronizer.sync(&changes).await
    }

    async fn tick(&self) -> Result<SyncReport> {
        let started = Instant::now();
        metrics::PENDING_CHANGES.set(i64::try_from(self.buffer.pending()).unwrap_or(i64::MAX));

        let mut report = self.reconcile().await?;
        report.merge(self.drain().await?);

        let documents = self.synchronizer.index().list_documents()?.len();
        metrics::INDEXED_DOCUMENTS.set(i64::try_from(documents).unwrap_or(i64::MAX));
        metrics::SYNC_CYCLE_DURATION.observe(started.elapsed().as_secs_f64());

        if !report.is_empty() {
            tracing::info!(
                upserted = report.upserted,
                deleted = report.deleted,
                failed = report.failed,
                documents,
                "Sync cycle complete"
            );
        }
        Ok(report)
    }
}

/// Drives the watcher, the reconciler and the synchronizer.
pub struct SyncWorker {
    cycle: Cycle,
    watcher: DirectoryWatcher,
    filter: ChangeFilter,
    interval: Duration,
    state: watch::Sender<WorkerState>,
}

impl SyncWorker {
    /// Create a worker for the root of `filter`.
    #[must_use]
    pub fn new(synchronizer: Arc<Synchronizer>, filter: ChangeFilter, interval: Duration) -> Self {
        let buffer = Arc::new(EventBuffer::new());
        let watcher =
            DirectoryWatcher::new(filter.root(), filter.clone(), Arc::clone(&buffer), None);
        let (state, _) = watch::channel(WorkerState::Starting);

        Self {
            cycle: Cycle {
                synchronizer,
                reconciler: Reconciler::new(filter.clone()),
                buffer,
            },
            watcher,
            filter,
            interval,
            state,
        }
    }

    /// Build the whole pipeline from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &Config, index: Arc<dyn VectorIndex>) -> Result<Self> {
        config.validate()?;
        let filter = ChangeFilter::from_config(config)?;
        let synchronizer = Arc::new(Synchronizer::from_config(config, index));
        Ok(Self::new(synchronizer, filter, config.sync_interval))
    }

    /// Notify `observer` of every accepted change.
    #[must_use]
    pub fn with_observer(mut self, observer: ChangeObserver) -> Self {
        self.watcher = DirectoryWatcher::new(
            self.filter.root(),
            self.filter.clone(),
            Arc::clone(&self.cycle.buffer),
            Some(observer),
        );
        self
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Buffer fed by the watcher.
    #[must_use]
    pub fn buffer(&self) -> &Arc<EventBuffer> {
        &self.cycle.buffer
    }

    #[must_use]
    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.cycle.synchronizer
    }

    /// Reconcile and drain the buffer once.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is unavailable; per-file failures are
    /// only counted.
    pub async fn tick(&self) -> Result<SyncReport> {
        self.cycle.tick().await
    }

    /// Run until `cancel` fires.
    ///
    /// Tick failures are logged and retried on the next tick. Cancellation
    /// interrupts the sleep between ticks, and the watcher is fully detached
    /// before the state becomes [`WorkerState::Stopped`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the watcher cannot be attached.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let Self {
            cycle,
            mut watcher,
            interval,
            state,
            ..
        } = self;

        let transition = |next: WorkerState| {
            tracing::debug!(state = %next, "Worker state changed");
            state.send_replace(next);
        };

        transition(WorkerState::Starting);
        if let Err(e) = watcher.start() {
            tracing::error!(error = %e, "Failed to start directory watcher");
            transition(WorkerState::Stopped);
            return Err(e);
        }

        match cycle.reconcile().await {
            Ok(report) => tracing::info!(
                upserted = report.upserted,
                deleted = report.deleted,
                failed = report.failed,
                "Initial reconciliation complete"
            ),
            Err(e) => tracing::error!(error = %e, "Initial reconciliation failed"),
        }

        transition(WorkerState::Running);
        tracing::info!(interval_secs = interval.as_secs_f64(), "Sync worker running");

        while !cancel.is_cancelled() {
            if let Err(e) = cycle.tick().await {
                tracing::error!(error = %e, "Sync cycle failed, retrying next tick");
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }

        transition(WorkerState::Stopping);
        watcher.stop();
        transition(WorkerState::Stopped);
        tracing::info!("Sync worker stopped");
        Ok(())
    }
}

impl std::fmt::Debug for SyncWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWorker")
            .field("root", &self.filter.root())
            .field("interval", &self.interval)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
