//! Command-line arguments.

use std::path::PathBuf;

use batchconv_client::api::ConversionKind;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Submit documents to a conversion backend and collect the results.
#[derive(Parser, Debug)]
#[command(name = "batchconv", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Backend base URL (overrides CONVERT_API_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Status poll interval in milliseconds (overrides POLL_INTERVAL_MS)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert every file in a directory as one batch
    ///
    /// Uploads the directory, follows per-file progress until every file
    /// has converted or failed, then downloads the packaged result.
    Batch {
        /// Directory to upload
        dir: PathBuf,

        /// Also include the merged document in the package
        #[arg(long)]
        merged: bool,

        /// Where to save the package (defaults to the current directory)
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Stop after the batch completes without downloading
        #[arg(long, conflicts_with = "merged")]
        no_download: bool,
    },

    /// Download the package of a batch submitted earlier
    ///
    /// Follows the batch until it has finished, then fetches the package.
    /// Use it when `batch` ran with `--no-download` or the package was not
    /// ready yet.
    Download {
        /// Job id printed by `batch`
        job_id: String,

        /// Also include the merged document in the package
        #[arg(long)]
        merged: bool,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Convert a single file
    Convert {
        file: PathBuf,

        #[arg(short, long, value_enum, default_value_t = KindArg::PdfToDocx)]
        kind: KindArg,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// List the OCR workflows configured on the backend
    Workflows,

    /// Run a file through an OCR workflow
    Ocr {
        file: PathBuf,

        /// Workflow name, as listed by `batchconv workflows`
        #[arg(short, long)]
        workflow: String,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

/// Single-file conversion selectable on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    PdfToDocx,
    Generic,
    DwgToPdf,
}

impl From<KindArg> for ConversionKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::PdfToDocx => ConversionKind::PdfToDocx,
            KindArg::Generic => ConversionKind::Generic,
            KindArg::DwgToPdf => ConversionKind::DwgToPdf,
        }
    }
}
