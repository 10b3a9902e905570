//! Fixed-rate status polling for one batch job.
//!
//! [`StatusPoller::spawn`] starts a task that, on every tick, fetches
//! the per-file status and then the summary for a job, and forwards the
//! result as a [`PollEvent`]. The tick body is awaited inline, so at
//! most one poll is ever in flight and slow responses delay the next
//! tick instead of piling up.
//!
//! A failed request skips the tick without touching anything. After
//! [`PollerConfig::stall_threshold`] failures in a row a single
//! [`PollEventKind::Stalled`] is emitted; polling carries on.
//!
//! The task stops itself on the first tick that reaches the terminal
//! state, when its [`PollHandle`] is cancelled or dropped, or when the
//! event receiver goes away. Results that resolve after cancellation
//! are discarded.

use std::sync::Arc;
use std::time::Duration;

use batchconv_core::batch::{is_batch_complete, records_settled};
use batchconv_core::error::CoreError;
use batchconv_core::types::JobId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{error_chain, BatchBackend, ConvertApiError};
use crate::events::{PollEvent, PollEventKind, PollUpdate};
use crate::messages::normalize_status_entries;

/// Smallest interval accepted; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Tunable parameters for the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between ticks. The first tick fires one interval after start.
    pub interval: Duration,
    /// Consecutive failed ticks before a stall is reported. `0` disables it.
    pub stall_threshold: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1500),
            stall_threshold: 10,
        }
    }
}

/// Why a single poll tick was skipped.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Status request failed")]
    Status(#[source] ConvertApiError),

    #[error("Summary request failed")]
    Summary(#[source] ConvertApiError),

    #[error(transparent)]
    Inconsistent(#[from] CoreError),
}

/// Spawns polling tasks against a backend.
#[derive(Clone)]
pub struct StatusPoller {
    backend: Arc<dyn BatchBackend>,
    config: PollerConfig,
}

/// Handle to a running polling task.
///
/// Dropping the handle cancels the task.
pub struct PollHandle {
    job_id: JobId,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Stop polling. No event is emitted after this returns.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `true` once the polling task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the polling task to exit.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(job_id = %self.job_id, error = %e, "Polling task panicked");
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl StatusPoller {
    pub fn new(backend: Arc<dyn BatchBackend>, config: PollerConfig) -> Self {
        Self { backend, config }
    }

    /// Start polling `job_id`, sending events to `events`.
    pub fn spawn(&self, job_id: JobId, events: mpsc::Sender<PollEvent>) -> PollHandle {
        let cancel = CancellationToken::new();
        let backend = Arc::clone(&self.backend);
        let config = self.config;
        let task_job_id = job_id.clone();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            tracing::info!(job_id = %task_job_id, interval_ms = config.interval.as_millis() as u64, "Polling started");
            run_poll_loop(backend.as_ref(), &task_job_id, config, &events, &task_cancel).await;
            tracing::debug!(job_id = %task_job_id, "Polling task exited");
        });

        PollHandle {
            job_id,
            cancel,
            task: Some(task),
        }
    }
}

/// Fetch status then summary for one tick.
///
/// Nothing is returned unless both requests succeed, so a failure never
/// yields a partial update.
pub async fn poll_once(backend: &dyn BatchBackend, job_id: &JobId) -> Result<PollUpdate, PollError> {
    let raw = backend.fetch_status(job_id).await.map_err(PollError::Status)?;
    let snapshot = normalize_status_entries(raw);
    if snapshot.dropped > 0 {
        tracing::debug!(job_id = %job_id, dropped = snapshot.dropped, "Dropped malformed status rows");
    }

    let summary = backend.fetch_summary(job_id).await.map_err(PollError::Summary)?;
    summary.validate()?;

    let completed = is_batch_complete(&summary) && records_settled(&snapshot.records);

    Ok(PollUpdate {
        records: snapshot.records,
        summary,
        meta: snapshot.meta,
        completed,
        polled_at: chrono::Utc::now(),
    })
}

/// Core polling loop: wait for tick -> poll -> emit.
///
/// Runs until completion, cancellation, or the receiver is dropped.
async fn run_poll_loop(
    backend: &dyn BatchBackend,
    job_id: &JobId,
    config: PollerConfig,
    events: &mpsc::Sender<PollEvent>,
    cancel: &CancellationToken,
) {
    let period = config.interval.max(MIN_INTERVAL);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut consecutive_failures = 0u32;
    let mut stalled = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job_id = %job_id, "Polling cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        let outcome = poll_once(backend, job_id).await;

        // In-flight requests are not aborted; a late result is dropped here.
        if cancel.is_cancelled() {
            tracing::debug!(job_id = %job_id, "Discarding poll result that resolved after cancellation");
            return;
        }

        match outcome {
            Ok(update) => {
                consecutive_failures = 0;
                if stalled {
                    stalled = false;
                    tracing::info!(job_id = %job_id, "Polling recovered");
                    if !emit(events, cancel, job_id, PollEventKind::Recovered).await {
                        return;
                    }
                }

                let completed = update.completed;
                let summary = update.summary;
                tracing::debug!(
                    job_id = %job_id,
                    total = summary.total,
                    converted = summary.converted,
                    failed = summary.failed,
                    records = update.records.len(),
                    "Poll tick",
                );

                if !emit(events, cancel, job_id, PollEventKind::Update(update)).await {
                    return;
                }

                if completed {
                    tracing::info!(
                        job_id = %job_id,
                        total = summary.total,
                        converted = summary.converted,
                        failed = summary.failed,
                        "Batch complete, polling stopped",
                    );
                    return;
                }
            }
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                let error = error_chain(&e);
                tracing::warn!(
                    job_id = %job_id,
                    consecutive = consecutive_failures,
                    error = %error,
                    "Poll tick skipped",
                );

                let kind = PollEventKind::TickFailed {
                    consecutive: consecutive_failures,
                    error,
                };
                if !emit(events, cancel, job_id, kind).await {
                    return;
                }

                if !stalled
                    && config.stall_threshold > 0
                    && consecutive_failures >= config.stall_threshold
                {
                    stalled = true;
                    tracing::error!(
                        job_id = %job_id,
                        consecutive = consecutive_failures,
                        "Polling stalled: backend has not answered successfully",
                    );
                    let kind = PollEventKind::Stalled {
                        consecutive: consecutive_failures,
                    };
                    if !emit(events, cancel, job_id, kind).await {
                        return;
                    }
                }
            }
        }
    }
}

/// Send an event unless the poller was cancelled. Returns `false` when
/// the loop should stop.
async fn emit(
    events: &mpsc::Sender<PollEvent>,
    cancel: &CancellationToken,
    job_id: &JobId,
    kind: PollEventKind,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }

    let event = PollEvent::new(job_id.clone(), kind);
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = events.send(event) => {
            if sent.is_err() {
                tracing::debug!(job_id = %job_id, "Event receiver dropped, stopping poller");
            }
            sent.is_ok()
        }
    }
}
