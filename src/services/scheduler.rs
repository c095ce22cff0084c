use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::config::AppConfig;
use crate::services::queue::{OrderQueue, QueueError};

/// Work executed for one dispatched order. The handler owns the workspace and
/// is responsible for claiming the order file into it.
pub trait OrderHandler: Send + Sync + 'static {
    fn handle(&self, order: String, workspace: TempDir) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Dispatching new orders
    Running,
    /// Shutdown requested, waiting for active builds
    Draining,
    /// All builds finished
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every active build finished within the grace period
    Graceful,
    /// Grace period elapsed with builds still running
    Forced { active: usize },
}

impl ShutdownOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownOutcome::Graceful => 0,
            ShutdownOutcome::Forced { .. } => 1,
        }
    }
}

/// Signals completion when dropped, so a panicking build still frees its slot.
struct CompletionGuard {
    order: Option<String>,
    done_tx: mpsc::UnboundedSender<String>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(order) = self.order.take() {
            let _ = self.done_tx.send(order);
        }
    }
}

/// Polls the order queue and runs at most `max_procs` builds at a time.
pub struct Scheduler<H> {
    queue: Arc<OrderQueue>,
    handler: Arc<H>,
    max_procs: usize,
    poll_interval: Duration,
    grace_period: Duration,
    active: usize,
    /// Orders handed to a task that has not finished yet
    in_flight: HashSet<String>,
    phase: SchedulerPhase,
}

impl<H: OrderHandler> Scheduler<H> {
    pub fn new(config: &AppConfig, queue: Arc<OrderQueue>, handler: Arc<H>) -> Self {
        Self {
            queue,
            handler,
            max_procs: config.max_procs.max(1),
            poll_interval: config.poll_interval(),
            grace_period: config.grace_period(),
            active: 0,
            in_flight: HashSet::new(),
            phase: SchedulerPhase::Running,
        }
    }

    pub fn with_intervals(mut self, poll_interval: Duration, grace_period: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.grace_period = grace_period;
        self
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn active(&self) -> usize {
        self.active
    }

    /// Dispatch orders until `shutdown` resolves, then drain.
    ///
    /// Queue listing and workspace creation failures are fatal and returned as errors.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<ShutdownOutcome, SchedulerError>
    where
        F: Future<Output = ()>,
    {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<String>();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        self.phase = SchedulerPhase::Running;
        tracing::info!(max_procs = self.max_procs, "Scheduler running");

        loop {
            self.dispatch(&done_tx).await?;

            tokio::select! {
                Some(order) = done_rx.recv() => self.finished(&order),
                _ = ticker.tick() => {}
                _ = &mut shutdown => break,
            }
        }

        self.phase = SchedulerPhase::Draining;
        tracing::info!(
            grace_period_secs = self.grace_period.as_secs(),
            active = self.active,
            "Shutting down"
        );

        let deadline = tokio::time::sleep(self.grace_period);
        tokio::pin!(deadline);

        while self.active > 0 {
            tracing::info!(active = self.active, "Shutdown in progress, waiting for builds to finish");
            tokio::select! {
                Some(order) = done_rx.recv() => self.finished(&order),
                _ = ticker.tick() => {}
                _ = &mut deadline => {
                    tracing::warn!(active = self.active, "Shutdown forced after end of grace period");
                    return Ok(ShutdownOutcome::Forced { active: self.active });
                }
            }
        }

        self.phase = SchedulerPhase::Stopped;
        tracing::info!("Gracefully shut down");
        Ok(ShutdownOutcome::Graceful)
    }

    /// Start one build if a slot is free and an order is waiting.
    ///
    /// Orders still held by a running task are skipped; their file may not
    /// have been claimed yet.
    async fn dispatch(&mut self, done_tx: &mpsc::UnboundedSender<String>) -> Result<(), SchedulerError> {
        if self.active >= self.max_procs {
            return Ok(());
        }
        let pending = self.queue.pending_orders().await.map_err(SchedulerError::Queue)?;
        let Some(order) = pending.into_iter().find(|name| !self.in_flight.contains(name)) else {
            return Ok(());
        };
        let workspace = self.queue.create_workspace().map_err(SchedulerError::Workspace)?;

        self.active += 1;
        self.in_flight.insert(order.clone());
        metrics::gauge!("map_builds_active").set(self.active as f64);
        tracing::debug!(order = %order, active = self.active, "Dispatching build");

        let handler = Arc::clone(&self.handler);
        let guard = CompletionGuard {
            order: Some(order.clone()),
            done_tx: done_tx.clone(),
        };
        tokio::spawn(async move {
            let _guard = guard;
            handler.handle(order, workspace).await;
        });
        Ok(())
    }

    fn finished(&mut self, order: &str) {
        self.in_flight.remove(order);
        self.active = self.active.saturating_sub(1);
        metrics::gauge!("map_builds_active").set(self.active as f64);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Cannot list order queue: {0}")]
    Queue(QueueError),

    #[error("Cannot create build workspace: {0}")]
    Workspace(QueueError),
}
