//! Collecting local files for upload.
//!
//! A batch is a directory picked by the user. Every file below it is
//! uploaded with its path relative to the directory's parent, so the
//! first segment is always the folder's own name (`plans/sub/a.pdf`).
//! The server uses these paths to rebuild the folder structure.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// One file queued for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// `/`-separated path relative to the selected root folder's parent,
    /// or the bare filename for a loose file.
    pub relative_path: String,
    pub content: Vec<u8>,
}

impl UploadFile {
    pub fn new(relative_path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: content.into(),
        }
    }

    /// Read a single loose file; its relative path is the bare filename.
    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::InvalidName(path.to_path_buf()))?
            .to_string();

        let content = tokio::fs::read(path).await.map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self::new(file_name, content))
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Returns `true` for dotfiles and OS-generated clutter.
pub fn is_hidden_or_system(file_name: &str) -> bool {
    file_name.starts_with('.') || file_name == "Thumbs.db" || file_name == "desktop.ini"
}

/// Read every file below `root`, in a stable name order.
///
/// Hidden and system files are skipped; no other filtering happens, the
/// server decides what it can convert.
pub fn collect_directory(root: &Path) -> Result<Vec<UploadFile>, UploadError> {
    let root = root.canonicalize().map_err(|source| UploadError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    if !root.is_dir() {
        return Err(UploadError::NotADirectory(root));
    }

    let root_name = root
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string);

    let walker = WalkDir::new(&root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || entry
                    .file_name()
                    .to_str()
                    .map(|name| !is_hidden_or_system(name))
                    .unwrap_or(false)
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path
            .strip_prefix(&root)
            .map_err(|_| UploadError::InvalidName(path.to_path_buf()))?;
        let relative = join_components(relative)
            .ok_or_else(|| UploadError::InvalidName(path.to_path_buf()))?;

        let relative_path = match &root_name {
            Some(root_name) => format!("{root_name}/{relative}"),
            None => relative,
        };

        let content = std::fs::read(path).map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %relative_path, bytes = content.len(), "Collected file for upload");
        files.push(UploadFile::new(relative_path, content));
    }

    if files.is_empty() {
        return Err(UploadError::Empty(root));
    }

    tracing::info!(root = %root.display(), count = files.len(), "Collected batch for upload");
    Ok(files)
}

/// Join the normal components of a relative path with `/`.
fn join_components(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Errors from gathering files to upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk directory")]
    Walk(#[from] walkdir::Error),

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("No files to upload in {}", .0.display())]
    Empty(PathBuf),

    #[error("Path has no usable UTF-8 file name: {}", .0.display())]
    InvalidName(PathBuf),
}
