//! Shared test infrastructure for client integration tests.
//!
//! [`ScriptedBackend`] is an in-memory [`BatchBackend`] that replays a
//! script of poll ticks and counts every request it receives.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use batchconv_client::api::{BatchBackend, ConvertApiError, SubmitResponse};
use batchconv_client::artifact::Payload;
use batchconv_client::poller::PollerConfig;
use batchconv_client::upload::UploadFile;
use batchconv_core::batch::BatchSummary;
use batchconv_core::types::JobId;
use serde_json::{json, Value};
use tokio::sync::Notify;

/// Interval short enough to keep scenario tests fast.
pub const FAST_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound for any single wait in a test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub fn fast_config(stall_threshold: u32) -> PollerConfig {
    PollerConfig {
        interval: FAST_INTERVAL,
        stall_threshold,
    }
}

/// What the backend answers on one poll tick.
#[derive(Debug, Clone)]
pub enum Tick {
    Ok {
        status: Vec<Value>,
        summary: BatchSummary,
    },
    /// The status request fails with this HTTP status.
    StatusError(u16),
    /// The status request succeeds but the summary request fails.
    SummaryError { status: Vec<Value>, code: u16 },
}

impl Tick {
    pub fn ok(status: Vec<Value>, summary: BatchSummary) -> Self {
        Tick::Ok { status, summary }
    }
}

pub fn row(name: &str, status: &str, progress: u32) -> Value {
    json!({ "name": name, "status": status, "progress": progress, "output": status.contains('✔') })
}

fn unavailable(code: u16) -> ConvertApiError {
    ConvertApiError::ApiError {
        status: code,
        message: "Service Unavailable".to_string(),
    }
}

/// In-memory backend replaying a fixed script of ticks.
///
/// Once the script is exhausted the last tick is repeated.
pub struct ScriptedBackend {
    job_ids: Mutex<VecDeque<String>>,
    folder: Option<String>,
    script: Mutex<VecDeque<Tick>>,
    current: Mutex<Option<Tick>>,
    download: Mutex<Option<Result<Payload, u16>>>,
    /// When set, every status request waits for a permit first.
    gate: Option<Arc<Notify>>,

    pub submitted: Mutex<Vec<Vec<String>>>,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub summary_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    latency: Duration,
}

impl ScriptedBackend {
    pub fn new(job_id: &str, script: Vec<Tick>) -> Self {
        Self {
            job_ids: Mutex::new(VecDeque::from([job_id.to_string()])),
            folder: None,
            script: Mutex::new(script.into()),
            current: Mutex::new(None),
            download: Mutex::new(None),
            gate: None,
            submitted: Mutex::new(Vec::new()),
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            summary_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    /// Hand out these job ids to successive submissions.
    pub fn with_job_ids(self, ids: &[&str]) -> Self {
        *self.job_ids.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_folder(mut self, folder: &str) -> Self {
        self.folder = Some(folder.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_download(self, result: Result<Payload, u16>) -> Self {
        *self.download.lock().unwrap() = Some(result);
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn next_tick(&self) -> Option<Tick> {
        let mut script = self.script.lock().unwrap();
        let mut current = self.current.lock().unwrap();
        if let Some(tick) = script.pop_front() {
            *current = Some(tick);
        }
        current.clone()
    }
}

#[async_trait]
impl BatchBackend for ScriptedBackend {
    async fn submit_batch(&self, files: &[UploadFile]) -> Result<SubmitResponse, ConvertApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted
            .lock()
            .unwrap()
            .push(files.iter().map(|f| f.relative_path.clone()).collect());

        let id = {
            let mut ids = self.job_ids.lock().unwrap();
            if ids.len() > 1 {
                ids.pop_front()
            } else {
                ids.front().cloned()
            }
        };
        let job_id = id
            .and_then(|id| JobId::new(id).ok())
            .ok_or(ConvertApiError::MissingJobId)?;

        Ok(SubmitResponse {
            job_id,
            folder: self.folder.clone(),
        })
    }

    async fn fetch_status(&self, _job_id: &JobId) -> Result<Vec<Value>, ConvertApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.enter();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let result = match self.next_tick() {
            Some(Tick::Ok { status, .. }) | Some(Tick::SummaryError { status, .. }) => Ok(status),
            Some(Tick::StatusError(code)) => Err(unavailable(code)),
            None => Ok(Vec::new()),
        };
        self.leave();
        result
    }

    async fn fetch_summary(&self, _job_id: &JobId) -> Result<BatchSummary, ConvertApiError> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        self.enter();
        let current = self.current.lock().unwrap().clone();
        let result = match current {
            Some(Tick::Ok { summary, .. }) => Ok(summary),
            Some(Tick::SummaryError { code, .. }) | Some(Tick::StatusError(code)) => {
                Err(unavailable(code))
            }
            None => Ok(BatchSummary::default()),
        };
        self.leave();
        result
    }

    async fn download_package(
        &self,
        _job_id: &JobId,
        _include_merged: bool,
    ) -> Result<Payload, ConvertApiError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        match self.download.lock().unwrap().clone() {
            Some(Ok(payload)) => Ok(payload),
            Some(Err(code)) => Err(unavailable(code)),
            None => Ok(Payload {
                bytes: b"PK".to_vec(),
                suggested_name: None,
            }),
        }
    }
}

/// Wait until `condition` holds, polling every millisecond.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
