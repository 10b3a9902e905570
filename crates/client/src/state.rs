//! In-memory view of one batch, built from poller events.
//!
//! [`apply_poll_result`] and [`apply_event`] are pure reducers: they
//! take the current state and return the next one. Each successful tick
//! replaces the visible file log wholesale, because the server always
//! reports the full status, never deltas.

use batchconv_core::batch::{BatchMeta, BatchSummary, FileRecord};
use batchconv_core::status::FileStatus;
use batchconv_core::types::JobId;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::events::{PollEvent, PollEventKind, PollUpdate};

/// Consistent snapshot of a batch for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchState {
    pub job_id: JobId,
    /// Folder the batch was submitted from; names the downloaded package.
    pub folder_name: String,
    /// Latest filtered file log.
    pub records: Vec<FileRecord>,
    pub summary: Option<BatchSummary>,
    pub meta: Option<BatchMeta>,
    /// Polling is active for this job.
    pub converting: bool,
    /// The poller reported the terminal state. Never reverts.
    pub batch_done: bool,
    /// Polling has failed repeatedly and is escalated to the user.
    pub stalled: bool,
    pub last_error: Option<String>,
    /// Successful ticks applied so far.
    pub polls: u64,
    pub last_polled_at: Option<DateTime<Utc>>,
}

/// Per-status tallies of the visible file log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unknown: usize,
}

impl BatchState {
    /// Fresh state for a job that has just been submitted.
    pub fn new(job_id: JobId, folder_name: impl Into<String>) -> Self {
        Self {
            job_id,
            folder_name: folder_name.into(),
            records: Vec::new(),
            summary: None,
            meta: None,
            converting: true,
            batch_done: false,
            stalled: false,
            last_error: None,
            polls: 0,
            last_polled_at: None,
        }
    }

    pub fn counts(&self) -> StatusCounts {
        self.records
            .iter()
            .fold(StatusCounts::default(), |mut counts, record| {
                match record.status {
                    FileStatus::Pending => counts.pending += 1,
                    FileStatus::Running => counts.running += 1,
                    FileStatus::Succeeded => counts.succeeded += 1,
                    FileStatus::Failed => counts.failed += 1,
                    FileStatus::Unknown => counts.unknown += 1,
                }
                counts
            })
    }

    /// Folder that names the downloaded package: the server's metadata
    /// when it reports one, else the name known at submission.
    pub fn archive_folder(&self) -> &str {
        self.meta
            .as_ref()
            .and_then(|m| m.folder_name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.folder_name)
    }

    /// The package can be requested.
    pub fn can_retrieve(&self) -> bool {
        self.batch_done
    }
}

/// Apply one successful poll tick.
///
/// `batch_done` only ever moves from `false` to `true`, and it follows
/// the poller's completion signal rather than being recomputed here.
pub fn apply_poll_result(state: &BatchState, update: &PollUpdate) -> BatchState {
    let batch_done = state.batch_done || update.completed;

    BatchState {
        records: update.records.clone(),
        summary: Some(update.summary),
        meta: update.meta.clone().or_else(|| state.meta.clone()),
        converting: state.converting && !batch_done,
        batch_done,
        polls: state.polls + 1,
        last_polled_at: Some(update.polled_at),
        ..state.clone()
    }
}

/// Apply any poller event.
///
/// Events for another job leave the state untouched. A skipped tick
/// changes nothing either; only a reported stall, or recovery from
/// one, is reflected.
pub fn apply_event(state: &BatchState, event: &PollEvent) -> BatchState {
    if event.job_id != state.job_id {
        tracing::debug!(
            current = %state.job_id,
            event_job = %event.job_id,
            "Ignoring event for a different job",
        );
        return state.clone();
    }

    match &event.kind {
        PollEventKind::Update(update) => apply_poll_result(state, update),
        PollEventKind::TickFailed { .. } => state.clone(),
        PollEventKind::Stalled { consecutive } => BatchState {
            stalled: true,
            last_error: Some(format!(
                "No successful status update in {consecutive} consecutive attempts"
            )),
            ..state.clone()
        },
        PollEventKind::Recovered => BatchState {
            stalled: false,
            last_error: None,
            ..state.clone()
        },
    }
}
