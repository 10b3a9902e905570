//! Per-file conversion status and its classification from wire text.
//!
//! Older backends report status as free text with an embedded glyph
//! (`"Converted ✔"`, `"Failed ❌"`) and stage words in between. Newer
//! ones send a structured value. Both are folded into [`FileStatus`];
//! text that matches neither becomes [`FileStatus::Unknown`] so it stays
//! visible instead of being silently treated as progress.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Glyph embedded in the status text of a successfully converted file.
pub const SUCCESS_MARKER: char = '✔';
/// Glyph embedded in the status text of a failed file.
pub const FAILURE_MARKER: char = '❌';

/// Stage words the backend reports while a file is being worked on.
const RUNNING_STAGES: &[&str] = &[
    "preparing",
    "uploading",
    "converting",
    "finalizing",
    "retrying",
];

/// Explicit status of one tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// The server sent a status we could not classify.
    Unknown,
}

impl FileStatus {
    /// Classify a status string received from the backend.
    pub fn from_wire(raw: &str) -> Self {
        let text = raw.trim();
        if text.is_empty() {
            return FileStatus::Unknown;
        }

        // Glyph markers take precedence over any surrounding words.
        if text.contains(SUCCESS_MARKER) {
            return FileStatus::Succeeded;
        }
        if text.contains(FAILURE_MARKER) {
            return FileStatus::Failed;
        }

        let lower = text.to_lowercase();
        match lower.as_str() {
            "pending" | "queued" | "waiting" => return FileStatus::Pending,
            "running" | "processing" => return FileStatus::Running,
            "succeeded" | "success" | "done" | "converted" => return FileStatus::Succeeded,
            "failed" | "error" => return FileStatus::Failed,
            _ => {}
        }

        if lower.starts_with("converted") {
            FileStatus::Succeeded
        } else if lower.starts_with("failed") {
            FileStatus::Failed
        } else if lower.starts_with("queued") || lower.starts_with("waiting") {
            FileStatus::Pending
        } else if RUNNING_STAGES.iter().any(|stage| lower.contains(stage)) {
            FileStatus::Running
        } else {
            FileStatus::Unknown
        }
    }

    /// `true` once the file will not change any more.
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Succeeded | FileStatus::Failed)
    }

    /// `true` while the backend is still expected to report changes.
    pub fn is_active(self) -> bool {
        matches!(self, FileStatus::Pending | FileStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Running => "running",
            FileStatus::Succeeded => "succeeded",
            FileStatus::Failed => "failed",
            FileStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
