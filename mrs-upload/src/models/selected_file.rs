//! A single file chosen by the user

use std::path::PathBuf;
use std::sync::Arc;

/// Where a selected file's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilePayload {
    /// File on local disk, read when the upload body is built
    Disk(PathBuf),
    /// Bytes already in memory (drag-and-drop buffers, tests)
    Memory(Arc<[u8]>),
}

impl FilePayload {
    /// Read the full payload
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match self {
            FilePayload::Disk(path) => tokio::fs::read(path).await,
            FilePayload::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// One file chosen by the user
///
/// `relative_path` is the bare file name for a flat pick, or the path
/// relative to the picked root (`/` separated, root folder name first) for a
/// directory pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub relative_path: String,
    pub payload: FilePayload,
}

impl SelectedFile {
    pub fn new(relative_path: impl Into<String>, payload: FilePayload) -> Self {
        Self {
            relative_path: relative_path.into(),
            payload,
        }
    }

    /// File backed by a path on disk
    pub fn from_disk(relative_path: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(relative_path, FilePayload::Disk(path.into()))
    }

    /// File backed by an in-memory buffer
    pub fn in_memory(relative_path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(relative_path, FilePayload::Memory(Arc::from(bytes.into())))
    }

    /// Last `/` segment of the relative path
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }
}
