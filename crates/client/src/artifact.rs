//! Downloaded conversion results.

use std::path::{Path, PathBuf};

use batchconv_core::naming;

/// Response body of a download or conversion request, before a final
/// filename has been chosen.
#[derive(Debug, Clone)]
pub struct Payload {
    pub bytes: Vec<u8>,
    /// Filename suggested by the server's `Content-Disposition` header.
    pub suggested_name: Option<String>,
}

impl Payload {
    /// Settle on a filename, preferring the server's suggestion.
    pub fn into_artifact<F>(self, fallback: F) -> Artifact
    where
        F: FnOnce() -> String,
    {
        Artifact {
            filename: self.suggested_name.unwrap_or_else(fallback),
            bytes: self.bytes,
        }
    }
}

/// A converted document or packaged batch ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Write the artifact into `dir`, creating the directory if needed.
    ///
    /// Only the last segment of the filename is used. Returns the path
    /// that was written.
    pub async fn save_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(naming::basename(&self.filename));
        tokio::fs::write(&path, &self.bytes).await?;
        tracing::info!(path = %path.display(), bytes = self.bytes.len(), "Saved artifact");
        Ok(path)
    }
}
