//! Batch job lifecycle controller.
//!
//! [`BatchController`] owns at most one job at a time: its id, the
//! polling task, and the aggregated [`BatchState`]. Submitting a new
//! batch cancels the previous poller first, so state from two jobs can
//! never interleave. Every poller event is checked against the active
//! job before it is applied.

use std::sync::Arc;

use batchconv_core::naming::{archive_filename, folder_name_for, DEFAULT_FOLDER_NAME};
use batchconv_core::types::JobId;
use tokio::sync::mpsc;

use crate::api::{error_chain, BatchBackend, ConvertApiError};
use crate::artifact::Artifact;
use crate::events::PollEvent;
use crate::poller::{PollHandle, PollerConfig, StatusPoller};
use crate::state::{apply_event, BatchState};
use crate::upload::UploadFile;

/// Buffered poller events per job.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Drives one batch from submission to artifact retrieval.
pub struct BatchController {
    backend: Arc<dyn BatchBackend>,
    poller: StatusPoller,
    active: Option<ActiveJob>,
    state: Option<BatchState>,
}

/// Internal bookkeeping for the job currently being polled.
struct ActiveJob {
    handle: PollHandle,
    events: mpsc::Receiver<PollEvent>,
}

impl BatchController {
    pub fn new(backend: Arc<dyn BatchBackend>, config: PollerConfig) -> Self {
        let poller = StatusPoller::new(Arc::clone(&backend), config);
        Self {
            backend,
            poller,
            active: None,
            state: None,
        }
    }

    /// State of the current (or last) job, if one was submitted.
    pub fn state(&self) -> Option<&BatchState> {
        self.state.as_ref()
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.state.as_ref().map(|s| &s.job_id)
    }

    /// `true` while a poller is attached to the current job.
    pub fn is_polling(&self) -> bool {
        self.active.is_some()
    }

    /// Upload a batch and start polling it.
    ///
    /// Any previous job's poller is cancelled before the request is sent.
    /// Submission is never retried here; on failure no job is started.
    pub async fn submit(&mut self, files: Vec<UploadFile>) -> Result<JobId, SubmissionError> {
        if files.is_empty() {
            return Err(SubmissionError::NoFiles);
        }

        self.stop_polling();

        let local_folder = folder_name_for(files.iter().map(|f| f.relative_path.as_str()));
        let total_bytes: usize = files.iter().map(UploadFile::size).sum();

        tracing::info!(
            files = files.len(),
            bytes = total_bytes,
            folder = %local_folder,
            "Submitting batch",
        );

        let response = self.backend.submit_batch(&files).await.map_err(|e| {
            tracing::error!(error = %error_chain(&e), "Batch submission failed");
            SubmissionError::from(e)
        })?;

        let job_id = response.job_id;
        let folder_name = response.folder.unwrap_or(local_folder);

        tracing::info!(job_id = %job_id, folder = %folder_name, "Batch accepted");

        self.state = Some(BatchState::new(job_id.clone(), folder_name));
        self.start_polling(job_id.clone());

        Ok(job_id)
    }

    /// Follow a batch submitted earlier, e.g. by another process.
    ///
    /// The folder name is unknown locally; it is taken from the server's
    /// metadata once a poll reports it. Retrieval stays gated on the
    /// poller seeing the batch complete.
    pub fn attach(&mut self, job_id: JobId) {
        self.stop_polling();

        tracing::info!(job_id = %job_id, "Attaching to existing batch");

        self.state = Some(BatchState::new(job_id.clone(), DEFAULT_FOLDER_NAME));
        self.start_polling(job_id);
    }

    /// Wait for the next poller event and fold it into the state.
    ///
    /// Returns `None` once the poller has finished or been stopped.
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        let active = self.active.as_mut()?;
        let received = active.events.recv().await;
        let accept = !active.handle.is_cancelled();

        let Some(event) = received else {
            self.detach();
            return None;
        };

        match self.state.as_ref() {
            Some(state) if accept && state.job_id == event.job_id => {
                let next = apply_event(state, &event);
                let done = next.batch_done;
                self.state = Some(next);
                if done {
                    self.detach();
                }
            }
            _ => {
                tracing::debug!(job_id = %event.job_id, "Discarding event for an inactive job");
            }
        }

        Some(event)
    }

    /// Drive polling until the batch is done or the poller ends,
    /// calling `on_event` after every applied event.
    ///
    /// Returns `true` if the batch reached its terminal state.
    pub async fn run_until_done<F>(&mut self, mut on_event: F) -> bool
    where
        F: FnMut(&PollEvent, &BatchState),
    {
        while let Some(event) = self.next_event().await {
            if let Some(state) = self.state.as_ref() {
                on_event(&event, state);
                if state.batch_done {
                    return true;
                }
            }
        }
        self.state.as_ref().is_some_and(|s| s.batch_done)
    }

    /// Stop polling the current job.
    ///
    /// Events already queued or still in flight are discarded; the state
    /// is left as it was, apart from `converting`.
    pub fn stop_polling(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::info!(job_id = %active.handle.job_id(), "Stopping poller");
            active.handle.cancel();
        }
        if let Some(state) = self.state.as_mut() {
            state.converting = false;
        }
    }

    /// Fetch the packaged result of the current job.
    ///
    /// Refused without a network request unless the batch is done. A
    /// failed download is reported as [`RetrievalError::NotReady`] and
    /// may simply be retried.
    pub async fn retrieve(&self, include_merged: bool) -> Result<Artifact, RetrievalError> {
        let state = self.state.as_ref().ok_or(RetrievalError::NoJob)?;
        if !state.batch_done {
            tracing::warn!(job_id = %state.job_id, "Retrieval requested before batch completion");
            return Err(RetrievalError::NotComplete {
                job_id: state.job_id.clone(),
            });
        }

        tracing::info!(job_id = %state.job_id, include_merged, "Requesting package");

        match self
            .backend
            .download_package(&state.job_id, include_merged)
            .await
        {
            Ok(payload) => Ok(payload.into_artifact(|| archive_filename(state.archive_folder()))),
            Err(e) => {
                tracing::warn!(job_id = %state.job_id, error = %error_chain(&e), "Package not ready");
                Err(RetrievalError::NotReady {
                    job_id: state.job_id.clone(),
                    source: e,
                })
            }
        }
    }

    fn start_polling(&mut self, job_id: JobId) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let handle = self.poller.spawn(job_id, tx);
        self.active = Some(ActiveJob { handle, events: rx });
    }

    /// Drop the poller after it finished on its own.
    fn detach(&mut self) {
        self.active = None;
        if let Some(state) = self.state.as_mut() {
            state.converting = false;
        }
    }
}

/// Errors raised when creating a batch.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("No files selected")]
    NoFiles,

    #[error("Batch submission failed")]
    Api(#[from] ConvertApiError),
}

/// Errors raised when fetching the packaged result.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("No batch has been submitted")]
    NoJob,

    /// The controller has not seen the batch complete.
    #[error("Batch {job_id} is not complete yet")]
    NotComplete { job_id: JobId },

    /// The backend refused or failed the download.
    #[error("Package for batch {job_id} is not ready")]
    NotReady {
        job_id: JobId,
        #[source]
        source: ConvertApiError,
    },
}
