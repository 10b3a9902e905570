//! `batchconv` -- command-line client for a batch document conversion backend.
//!
//! Uploads a directory as one batch, follows per-file progress until every
//! file has converted or failed, and downloads the packaged result. Also
//! offers single-file conversion and OCR.
//!
//! # Environment variables
//!
//! | Variable                | Required | Default                 | Description                         |
//! |-------------------------|----------|-------------------------|-------------------------------------|
//! | `CONVERT_API_BASE_URL`  | no       | `http://localhost:8000` | Backend base URL                    |
//! | `POLL_INTERVAL_MS`      | no       | `1500`                  | Milliseconds between status polls   |
//! | `POLL_STALL_THRESHOLD`  | no       | `10`                    | Failed polls before a stall warning |
//! | `REQUEST_TIMEOUT_SECS`  | no       | `120`                   | Per-request HTTP timeout            |
//! | `RUST_LOG`              | no       | `batchconv=info,...`    | Log filter                          |

use batchconv_cli::cli::Cli;
use batchconv_cli::commands;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let json = cli.global.json;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "batchconv=info,batchconv_client=info".into()),
        )
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    commands::run(cli).await
}
