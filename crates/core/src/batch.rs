//! Per-file records, aggregate counters, and batch completion rules.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::FileStatus;

// ---------------------------------------------------------------------------
// File records
// ---------------------------------------------------------------------------

/// One tracked input file within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Relative path of the file as submitted.
    pub name: String,
    pub status: FileStatus,
    /// Status text exactly as the server sent it.
    pub status_text: String,
    /// Completion percentage, clamped to 0..=100.
    pub progress: u8,
    /// Whether the server produced an output document for this file.
    #[serde(default)]
    pub output: bool,
}

impl FileRecord {
    /// Build a record from raw wire values, classifying the status text
    /// and clamping the progress into range.
    pub fn from_wire(name: impl Into<String>, status_text: &str, progress: i64, output: bool) -> Self {
        Self {
            name: name.into(),
            status: FileStatus::from_wire(status_text),
            status_text: status_text.to_string(),
            progress: clamp_progress(progress),
            output,
        }
    }
}

/// Clamp a raw progress value into the 0..=100 range.
pub fn clamp_progress(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

/// `true` when no visible record is still pending or running.
///
/// Used together with [`is_batch_complete`] so that a summary which
/// already counts every file as finished is not acted on while the
/// status snapshot from the same tick still shows work in progress.
pub fn records_settled(records: &[FileRecord]) -> bool {
    records.iter().all(|r| !r.status.is_active())
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Aggregate counters for a batch as reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: u32,
    /// Number of files converted successfully.
    pub converted: u32,
    pub failed: u32,
}

impl BatchSummary {
    pub fn new(total: u32, converted: u32, failed: u32) -> Self {
        Self {
            total,
            converted,
            failed,
        }
    }

    /// Files that are neither converted nor failed yet.
    pub fn pending(&self) -> u32 {
        self.total
            .saturating_sub(self.converted)
            .saturating_sub(self.failed)
    }

    /// Reject summaries that count more finished files than exist.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.converted.saturating_add(self.failed) > self.total {
            return Err(CoreError::InconsistentSummary {
                total: self.total,
                converted: self.converted,
                failed: self.failed,
            });
        }
        Ok(())
    }
}

/// The sole completion signal for a batch.
///
/// A batch is complete when every file is accounted for as converted or
/// failed. An empty summary (`total == 0`) is what the server reports
/// before it has registered any file, so it never counts as complete.
pub fn is_batch_complete(summary: &BatchSummary) -> bool {
    summary.total > 0 && summary.converted.saturating_add(summary.failed) == summary.total
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Batch-level metadata the server interleaves with the file rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMeta {
    /// Folder name the server derived from the uploaded paths.
    pub folder_name: Option<String>,
    /// Name of the merged document inside the package, once produced.
    pub combined: Option<String>,
    /// The server is pausing between chunks of work.
    #[serde(default)]
    pub cooldown: bool,
    #[serde(default)]
    pub cooldown_remaining: u32,
}
