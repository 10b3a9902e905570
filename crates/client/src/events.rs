//! Events emitted by the status poller.
//!
//! Every event is tagged with the job it belongs to so the consumer
//! can discard anything that arrives for a job it no longer tracks.

use batchconv_core::batch::{BatchMeta, BatchSummary, FileRecord};
use batchconv_core::types::JobId;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One successful poll tick: the full, filtered file snapshot plus the
/// summary fetched right after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollUpdate {
    pub records: Vec<FileRecord>,
    pub summary: BatchSummary,
    pub meta: Option<BatchMeta>,
    /// The poller has detected the terminal state and stopped itself.
    pub completed: bool,
    pub polled_at: DateTime<Utc>,
}

/// What happened on a poll tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PollEventKind {
    /// Status and summary were both fetched.
    Update(PollUpdate),

    /// A tick was skipped because one of its requests failed.
    TickFailed {
        /// Failed ticks in a row, including this one.
        consecutive: u32,
        error: String,
    },

    /// The number of consecutive failed ticks reached the stall threshold.
    Stalled { consecutive: u32 },

    /// A successful tick followed a reported stall.
    Recovered,
}

/// A poller event for a specific job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollEvent {
    pub job_id: JobId,
    pub kind: PollEventKind,
}

impl PollEvent {
    pub fn new(job_id: JobId, kind: PollEventKind) -> Self {
        Self { job_id, kind }
    }

    /// `true` for the update that carries the terminal state.
    pub fn is_completion(&self) -> bool {
        matches!(&self.kind, PollEventKind::Update(update) if update.completed)
    }
}
