//! Wire shapes returned by the conversion backend and their
//! normalisation into domain records.
//!
//! The status endpoint returns a JSON array that mixes per-file rows
//! (`{"name", "status", "progress", "output"}`) with a batch metadata
//! row that has no `status`. Rows are classified here, at the poller
//! boundary, so the state layer only ever sees well-formed records.

use batchconv_core::batch::{BatchMeta, FileRecord};
use serde::Deserialize;
use serde_json::Value;

/// Body of a successful `POST /convert/batch`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSubmitResponse {
    #[serde(default)]
    pub job_id: Option<String>,
    /// Folder name the server derived from the upload, if it reports one.
    #[serde(default)]
    pub folder: Option<String>,
}

/// A per-file row as sent by the backend.
///
/// Structured backends may send a display text next to the status
/// value; it is kept as the record's text when present.
#[derive(Debug, Clone, Deserialize)]
struct WireFileEntry {
    name: String,
    status: String,
    #[serde(default)]
    status_text: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    output: Option<bool>,
}

/// JSON error body used by the backend for non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub detail: Value,
}

/// The classified contents of one status response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub records: Vec<FileRecord>,
    pub meta: Option<BatchMeta>,
    /// Rows that were neither file records nor metadata.
    pub dropped: usize,
}

/// `true` if the entry is a file row: an object with a string `name`
/// and a string `status`.
pub fn is_file_entry(entry: &Value) -> bool {
    entry.get("name").is_some_and(Value::is_string)
        && entry.get("status").is_some_and(Value::is_string)
}

/// `true` if the entry is the batch metadata row.
fn is_meta_entry(entry: &Value) -> bool {
    entry.is_object()
        && !is_file_entry(entry)
        && (entry.get("folder_name").is_some() || entry.get("cooldown").is_some())
}

/// Classify a raw status response into file records and metadata.
///
/// Rows without a usable `name`/`status` pair are dropped and counted;
/// they never fail the whole response. Feeding serialized records back
/// in yields the same records.
pub fn normalize_status_entries(entries: Vec<Value>) -> StatusSnapshot {
    let mut snapshot = StatusSnapshot::default();

    for entry in entries {
        if is_file_entry(&entry) {
            match serde_json::from_value::<WireFileEntry>(entry) {
                Ok(row) => snapshot.records.push(FileRecord::from_wire(
                    row.name,
                    row.status_text.as_deref().unwrap_or(&row.status),
                    row.progress.unwrap_or(0.0).round() as i64,
                    row.output.unwrap_or(false),
                )),
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping malformed status row");
                    snapshot.dropped += 1;
                }
            }
        } else if is_meta_entry(&entry) {
            match serde_json::from_value::<BatchMeta>(entry) {
                Ok(meta) => snapshot.meta = Some(meta),
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping malformed metadata row");
                    snapshot.dropped += 1;
                }
            }
        } else {
            tracing::debug!(raw = %entry, "Dropping unrecognised status row");
            snapshot.dropped += 1;
        }
    }

    snapshot
}

/// Pull a human-readable message out of an error response body.
///
/// Prefers the `detail` field of a JSON body, falling back to the raw text.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.trim().to_string(),
    }
}
