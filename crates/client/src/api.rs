//! REST API client for the conversion backend.
//!
//! Wraps the backend's HTTP endpoints (batch submission, status and
//! summary polling, package download, single-file conversion, OCR)
//! using [`reqwest`]. The batch lifecycle endpoints are also exposed
//! through the [`BatchBackend`] trait so the poller and controller can
//! run against any implementation.

use async_trait::async_trait;
use batchconv_core::batch::BatchSummary;
use batchconv_core::naming;
use batchconv_core::types::JobId;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::artifact::{Artifact, Payload};
use crate::config::ClientConfig;
use crate::messages::{error_message, RawSubmitResponse};
use crate::upload::UploadFile;

/// Multipart field carrying every file of a batch.
pub const BATCH_FIELD: &str = "files";
/// Multipart field carrying the file of a single conversion.
pub const FILE_FIELD: &str = "file";
/// Multipart field naming the OCR workflow.
pub const WORKFLOW_FIELD: &str = "workflow_name";

/// Single-file conversions offered by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    /// `POST /convert/pdf-to-docx`
    PdfToDocx,
    /// `POST /convert`, the backend's default conversion.
    Generic,
    /// `POST /convert_dwg`, plots a drawing to PDF.
    DwgToPdf,
}

impl ConversionKind {
    pub fn endpoint(self) -> &'static str {
        match self {
            ConversionKind::PdfToDocx => "/convert/pdf-to-docx",
            ConversionKind::Generic => "/convert",
            ConversionKind::DwgToPdf => "/convert_dwg",
        }
    }

    /// Local output name used when the server does not suggest one.
    pub fn output_name(self, input: &str) -> String {
        match self {
            ConversionKind::PdfToDocx => naming::pdf_to_docx_output_name(input),
            ConversionKind::Generic => naming::GENERIC_OUTPUT_NAME.to_string(),
            ConversionKind::DwgToPdf => naming::dwg_to_pdf_output_name(input),
        }
    }
}

/// Result of a successful batch submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResponse {
    pub job_id: JobId,
    /// Folder name reported by the server, if any.
    pub folder: Option<String>,
}

/// The batch lifecycle endpoints.
#[async_trait]
pub trait BatchBackend: Send + Sync {
    /// `POST /convert/batch` with every file as a multipart part.
    async fn submit_batch(&self, files: &[UploadFile]) -> Result<SubmitResponse, ConvertApiError>;

    /// `GET /convert/status/{job_id}`, returned unclassified.
    async fn fetch_status(&self, job_id: &JobId) -> Result<Vec<Value>, ConvertApiError>;

    /// `GET /convert/summary/{job_id}`
    async fn fetch_summary(&self, job_id: &JobId) -> Result<BatchSummary, ConvertApiError>;

    /// `GET /convert/download/{job_id}?include_merged={0|1}`
    async fn download_package(
        &self,
        job_id: &JobId,
        include_merged: bool,
    ) -> Result<Payload, ConvertApiError>;
}

/// HTTP client for one conversion backend.
pub struct ConvertApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the conversion REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ConvertApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decoding).
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Conversion API error ({status}): {message}")]
    ApiError {
        status: u16,
        /// The `detail` of a JSON error body, or the raw body text.
        message: String,
    },

    /// The submission succeeded but the body carried no usable job id.
    #[error("Submit response did not contain a job id")]
    MissingJobId,
}

impl ConvertApiError {
    /// HTTP status of a non-2xx response, if that is what this error is.
    pub fn status(&self) -> Option<u16> {
        match self {
            ConvertApiError::ApiError { status, .. } => Some(*status),
            ConvertApiError::Request(e) => e.status().map(|s| s.as_u16()),
            ConvertApiError::MissingJobId => None,
        }
    }
}

impl ConvertApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:8000`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Create an API client with the timeout and base URL of `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConvertApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config.base_url.clone()))
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Convert one file synchronously and return the converted document.
    pub async fn convert_file(
        &self,
        kind: ConversionKind,
        file: &UploadFile,
    ) -> Result<Artifact, ConvertApiError> {
        let form = Form::new().part(FILE_FIELD, file_part(file));

        tracing::info!(
            endpoint = kind.endpoint(),
            file = %file.relative_path,
            bytes = file.size(),
            "Submitting single-file conversion",
        );

        let response = self
            .client
            .post(self.url(kind.endpoint()))
            .multipart(form)
            .send()
            .await?;

        let payload = Self::read_payload(response).await?;
        Ok(payload.into_artifact(|| kind.output_name(&file.relative_path)))
    }

    /// List the OCR workflows configured on the backend.
    pub async fn list_workflows(&self) -> Result<Vec<Value>, ConvertApiError> {
        let response = self.client.get(self.url("/workflows")).send().await?;
        Self::parse_response(response).await
    }

    /// Run `file` through the named OCR workflow and return the PDF.
    pub async fn ocr(
        &self,
        file: &UploadFile,
        workflow_name: &str,
    ) -> Result<Artifact, ConvertApiError> {
        let form = Form::new()
            .part(FILE_FIELD, file_part(file))
            .text(WORKFLOW_FIELD, workflow_name.to_string());

        let response = self
            .client
            .post(self.url("/ocr"))
            .multipart(form)
            .send()
            .await?;

        let payload = Self::read_payload(response).await?;
        Ok(payload.into_artifact(|| naming::ocr_output_name(&file.relative_path)))
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ConvertApiError::ApiError`]
    /// carrying the status and the server's message on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ConvertApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ConvertApiError::ApiError {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ConvertApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Read a binary body together with its suggested filename.
    async fn read_payload(response: reqwest::Response) -> Result<Payload, ConvertApiError> {
        let response = Self::ensure_success(response).await?;
        let suggested_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(naming::filename_from_content_disposition);
        let bytes = response.bytes().await?.to_vec();
        Ok(Payload {
            bytes,
            suggested_name,
        })
    }
}

#[async_trait]
impl BatchBackend for ConvertApi {
    async fn submit_batch(&self, files: &[UploadFile]) -> Result<SubmitResponse, ConvertApiError> {
        let form = files
            .iter()
            .fold(Form::new(), |form, file| form.part(BATCH_FIELD, file_part(file)));

        let response = self
            .client
            .post(self.url("/convert/batch"))
            .multipart(form)
            .send()
            .await?;

        let raw: RawSubmitResponse = Self::parse_response(response).await?;
        let job_id = raw
            .job_id
            .and_then(|id| JobId::new(id).ok())
            .ok_or(ConvertApiError::MissingJobId)?;

        Ok(SubmitResponse {
            job_id,
            folder: raw.folder.filter(|f| !f.trim().is_empty()),
        })
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<Vec<Value>, ConvertApiError> {
        let response = self
            .client
            .get(self.url(&format!("/convert/status/{job_id}")))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn fetch_summary(&self, job_id: &JobId) -> Result<BatchSummary, ConvertApiError> {
        let response = self
            .client
            .get(self.url(&format!("/convert/summary/{job_id}")))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn download_package(
        &self,
        job_id: &JobId,
        include_merged: bool,
    ) -> Result<Payload, ConvertApiError> {
        let flag = if include_merged { "1" } else { "0" };
        let response = self
            .client
            .get(self.url(&format!("/convert/download/{job_id}")))
            .query(&[("include_merged", flag)])
            .send()
            .await?;
        Self::read_payload(response).await
    }
}

/// Render an error followed by each of its causes, `: `-separated.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Multipart part for one file, named by its relative path.
fn file_part(file: &UploadFile) -> Part {
    Part::bytes(file.content.clone()).file_name(file.relative_path.clone())
}
