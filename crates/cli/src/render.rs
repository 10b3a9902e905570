//! Terminal rendering of batch progress.
//!
//! [`ProgressRenderer`] turns poller events into the lines printed by the
//! `batch` command. It only reports what changed since the previous
//! event, so a file that sits at the same stage for many ticks is
//! printed once.

use std::collections::HashMap;

use batchconv_client::events::{PollEvent, PollEventKind};
use batchconv_client::state::BatchState;
use batchconv_core::batch::{BatchMeta, BatchSummary, FileRecord};
use batchconv_core::status::FileStatus;
use serde_json::Value;

const BAR_WIDTH: usize = 20;

/// `[#########-----------]` for a 0..=100 progress value.
pub fn progress_bar(progress: u8) -> String {
    let filled = usize::from(progress.min(100)) * BAR_WIDTH / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

fn status_label(status: FileStatus) -> &'static str {
    match status {
        FileStatus::Pending => "queued",
        FileStatus::Running => "working",
        FileStatus::Succeeded => "done",
        FileStatus::Failed => "FAILED",
        FileStatus::Unknown => "unknown",
    }
}

/// One line per file: label, bar, percentage, name, and the server's own text.
pub fn file_line(record: &FileRecord) -> String {
    format!(
        "{:<8} {} {:>3}%  {}  ({})",
        status_label(record.status),
        progress_bar(record.progress),
        record.progress,
        record.name,
        record.status_text.trim(),
    )
}

pub fn summary_line(summary: &BatchSummary) -> String {
    format!(
        "{} files: {} converted, {} failed, {} pending",
        summary.total,
        summary.converted,
        summary.failed,
        summary.pending(),
    )
}

/// Notice shown while the server pauses between chunks of work.
pub fn cooldown_notice(meta: &BatchMeta) -> Option<String> {
    meta.cooldown
        .then(|| format!("Server cooling down, resuming in {}s", meta.cooldown_remaining))
}

/// Closing report once a batch is done, naming the merged document when
/// the server produced one.
pub fn final_report(state: &BatchState) -> String {
    let counts = state.counts();
    let mut report = format!(
        "Batch {} finished: {} converted, {} failed",
        state.job_id, counts.succeeded, counts.failed
    );

    let unsettled = state
        .records
        .iter()
        .filter(|record| !record.status.is_terminal())
        .count();
    if unsettled > 0 {
        report.push_str(&format!(", {unsettled} without a final status"));
    }

    let combined = state
        .meta
        .as_ref()
        .and_then(|m| m.combined.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty());
    if let Some(name) = combined {
        report.push_str(&format!("; merged document: {name}"));
    }
    report
}

/// One line per OCR workflow descriptor: its name, then any other fields.
pub fn workflow_line(workflow: &Value) -> String {
    let Some(name) = workflow.get("name").and_then(Value::as_str) else {
        return workflow.to_string();
    };
    let mut details: Vec<String> = workflow
        .as_object()
        .into_iter()
        .flatten()
        .filter(|(key, _)| key.as_str() != "name")
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}={s}"),
            other => format!("{key}={other}"),
        })
        .collect();
    details.sort();

    if details.is_empty() {
        name.to_string()
    } else {
        format!("{name}  {}", details.join(" "))
    }
}

/// Tracks what has been printed so far for one batch.
#[derive(Debug, Default)]
pub struct ProgressRenderer {
    files: HashMap<String, (FileStatus, String, u8)>,
    summary: Option<BatchSummary>,
    cooldown: bool,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for `event`, given the state after applying it.
    pub fn lines(&mut self, event: &PollEvent, state: &BatchState) -> Vec<String> {
        match &event.kind {
            PollEventKind::Update(update) => {
                let mut lines: Vec<String> = update
                    .records
                    .iter()
                    .filter(|record| self.record_changed(record))
                    .map(file_line)
                    .collect();

                if self.summary != Some(update.summary) {
                    self.summary = Some(update.summary);
                    lines.push(summary_line(&update.summary));
                }

                let cooldown = state.meta.as_ref().is_some_and(|m| m.cooldown);
                if cooldown && !self.cooldown {
                    lines.extend(state.meta.as_ref().and_then(cooldown_notice));
                }
                self.cooldown = cooldown;

                if update.completed {
                    lines.push(final_report(state));
                }
                lines
            }
            // Logged by the poller; nothing changes on screen.
            PollEventKind::TickFailed { .. } => Vec::new(),
            PollEventKind::Stalled { consecutive } => vec![format!(
                "Backend not responding after {consecutive} attempts, still trying (Ctrl-C to stop)"
            )],
            PollEventKind::Recovered => vec!["Backend responding again".to_string()],
        }
    }

    fn record_changed(&mut self, record: &FileRecord) -> bool {
        let current = (record.status, record.status_text.clone(), record.progress);
        match self.files.get(&record.name) {
            Some(previous) if *previous == current => false,
            _ => {
                self.files.insert(record.name.clone(), current);
                true
            }
        }
    }
}
