//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use batchconv_client::api::{ConversionKind, ConvertApi};
use batchconv_client::config::ClientConfig;
use batchconv_client::controller::{BatchController, RetrievalError};
use batchconv_client::upload::{collect_directory, UploadFile};
use batchconv_core::types::JobId;

use crate::cli::{Cli, Command, GlobalArgs};
use crate::render::{workflow_line, ProgressRenderer};

/// Environment configuration with command-line overrides applied.
pub fn load_config(global: &GlobalArgs) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::from_env().context("Invalid configuration")?;
    if let Some(url) = &global.base_url {
        config = config.with_base_url(url).context("Invalid --base-url")?;
    }
    if let Some(ms) = global.interval_ms {
        config.poll_interval = Duration::from_millis(ms);
    }
    Ok(config)
}

/// Options of the `batch` subcommand.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub dir: PathBuf,
    pub merged: bool,
    pub output: PathBuf,
    pub no_download: bool,
}

/// Options of the `download` subcommand.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub job_id: String,
    pub merged: bool,
    pub output: PathBuf,
}

/// Command that fetches the package of `job_id` later.
pub fn download_hint(job_id: &JobId, merged: bool) -> String {
    if merged {
        format!("batchconv download {job_id} --merged")
    } else {
        format!("batchconv download {job_id}")
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.global)?;
    let api = ConvertApi::from_config(&config).context("Failed to build HTTP client")?;

    tracing::debug!(base_url = %api.api_url(), "Using conversion backend");

    match cli.command {
        Command::Batch {
            dir,
            merged,
            output,
            no_download,
        } => {
            let options = BatchOptions {
                dir,
                merged,
                output,
                no_download,
            };
            run_batch(api, &config, options).await
        }
        Command::Download {
            job_id,
            merged,
            output,
        } => {
            let options = DownloadOptions {
                job_id,
                merged,
                output,
            };
            run_download(api, &config, options).await
        }
        Command::Convert { file, kind, output } => {
            let path = run_convert(&api, &file, kind.into(), &output).await?;
            println!("Saved {}", path.display());
            Ok(())
        }
        Command::Workflows => run_workflows(&api).await,
        Command::Ocr {
            file,
            workflow,
            output,
        } => {
            let path = run_ocr(&api, &file, &workflow, &output).await?;
            println!("Saved {}", path.display());
            Ok(())
        }
    }
}

/// Upload a directory, follow it to completion, and save the package.
pub async fn run_batch(
    api: ConvertApi,
    config: &ClientConfig,
    options: BatchOptions,
) -> anyhow::Result<()> {
    let dir = options.dir.clone();
    let files = tokio::task::spawn_blocking(move || collect_directory(&dir))
        .await
        .context("Directory scan task failed")?
        .with_context(|| format!("Failed to read {}", options.dir.display()))?;

    println!("Uploading {} files from {}", files.len(), options.dir.display());

    let mut controller = BatchController::new(Arc::new(api), config.poller());
    let job_id = controller.submit(files).await?;
    println!("Batch {job_id} accepted");

    follow_until_done(&mut controller, &job_id).await?;

    if options.no_download {
        println!(
            "Skipping download; fetch the package later with `{}`",
            download_hint(&job_id, false)
        );
        return Ok(());
    }

    save_package(&controller, &job_id, options.merged, &options.output).await
}

/// Follow a batch submitted earlier and save its package.
pub async fn run_download(
    api: ConvertApi,
    config: &ClientConfig,
    options: DownloadOptions,
) -> anyhow::Result<()> {
    let job_id = JobId::new(options.job_id).context("Invalid job id")?;

    let mut controller = BatchController::new(Arc::new(api), config.poller());
    controller.attach(job_id.clone());
    println!("Following batch {job_id}");

    follow_until_done(&mut controller, &job_id).await?;
    save_package(&controller, &job_id, options.merged, &options.output).await
}

/// Print progress until the batch is done. Ctrl-C stops polling.
async fn follow_until_done(
    controller: &mut BatchController,
    job_id: &JobId,
) -> anyhow::Result<()> {
    let mut renderer = ProgressRenderer::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        let event = tokio::select! {
            event = controller.next_event() => event,
            _ = &mut ctrl_c => {
                interrupted = true;
                None
            }
        };
        let Some(event) = event else {
            break;
        };

        if let Some(state) = controller.state() {
            for line in renderer.lines(&event, state) {
                println!("{line}");
            }
            if state.batch_done {
                break;
            }
        }
    }

    if interrupted {
        controller.stop_polling();
        tracing::info!(job_id = %job_id, "Interrupted, polling stopped");
        bail!("Interrupted before batch {job_id} finished");
    }

    if !controller.state().is_some_and(|s| s.batch_done) {
        bail!("Polling for batch {job_id} ended before the batch finished");
    }
    Ok(())
}

/// Retrieve the package of a finished batch and write it into `output`.
///
/// A package that is not ready yet leaves the job on the server; the
/// error names the command that fetches it later.
async fn save_package(
    controller: &BatchController,
    job_id: &JobId,
    merged: bool,
    output: &Path,
) -> anyhow::Result<()> {
    let artifact = match controller.retrieve(merged).await {
        Ok(artifact) => artifact,
        Err(e @ RetrievalError::NotReady { .. }) => {
            let hint = download_hint(job_id, merged);
            return Err(anyhow::Error::new(e).context(format!("Retry later with `{hint}`")));
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("Could not download the package for batch {job_id}")));
        }
    };

    let path = artifact
        .save_to(output)
        .await
        .with_context(|| format!("Failed to write into {}", output.display()))?;

    println!("Saved {}", path.display());
    Ok(())
}

/// Convert one file and save the result into `output`.
pub async fn run_convert(
    api: &ConvertApi,
    file: &Path,
    kind: ConversionKind,
    output: &Path,
) -> anyhow::Result<PathBuf> {
    let upload = UploadFile::from_path(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let artifact = api
        .convert_file(kind, &upload)
        .await
        .with_context(|| format!("Conversion of {} failed", file.display()))?;

    let path = artifact
        .save_to(output)
        .await
        .with_context(|| format!("Failed to write into {}", output.display()))?;
    Ok(path)
}

pub async fn run_workflows(api: &ConvertApi) -> anyhow::Result<()> {
    let workflows = api
        .list_workflows()
        .await
        .context("Failed to list OCR workflows")?;

    if workflows.is_empty() {
        println!("No OCR workflows configured");
    }
    for workflow in &workflows {
        println!("{}", workflow_line(workflow));
    }
    Ok(())
}

/// Run one file through an OCR workflow and save the PDF into `output`.
pub async fn run_ocr(
    api: &ConvertApi,
    file: &Path,
    workflow: &str,
    output: &Path,
) -> anyhow::Result<PathBuf> {
    let upload = UploadFile::from_path(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let artifact = api
        .ocr(&upload, workflow)
        .await
        .with_context(|| format!("OCR workflow '{workflow}' failed for {}", file.display()))?;

    let path = artifact
        .save_to(output)
        .await
        .with_context(|| format!("Failed to write into {}", output.display()))?;
    Ok(path)
}
