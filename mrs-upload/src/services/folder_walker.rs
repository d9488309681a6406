//! Recursive folder collection
//!
//! Two ways of turning a folder into [`SelectedFile`]s:
//! - [`FolderWalker::collect_dcm`]: the explicit folder add. Only `.dcm`
//!   files are kept and every relative path starts with the batch label.
//! - [`FolderWalker::flat_selection`]: what a `webkitdirectory` file input
//!   reports. Every file is listed (no filtering) with a path starting at the
//!   picked folder's own name; the merge step does the filtering/grouping.
//!
//! Unlike a library scan, a walk error aborts the whole collection: a folder
//! contributes either all of its files or nothing.

use crate::error::{SelectionError, SelectionResult};
use crate::models::SelectedFile;
use crate::services::group_resolver::{is_dcm_file_name, UNKNOWN_GROUP};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Folder tree walker
#[derive(Debug, Clone)]
pub struct FolderWalker {
    ignore_names: Vec<String>,
}

impl Default for FolderWalker {
    fn default() -> Self {
        Self::new()
    }
}

impl FolderWalker {
    /// Create new walker with default ignore list
    ///
    /// Skips VCS folders and OS metadata files (.DS_Store, Thumbs.db).
    pub fn new() -> Self {
        Self {
            ignore_names: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
        }
    }

    /// Collect `.dcm` files as `<root_label>/<subpath...>/<file>`
    pub fn collect_dcm(&self, root: &Path, root_label: &str) -> SelectionResult<Vec<SelectedFile>> {
        let files = self.walk(root, root_label, is_dcm_file_name)?;

        tracing::debug!(
            root = %root.display(),
            label = root_label,
            files = files.len(),
            "Collected .dcm files"
        );

        Ok(files)
    }

    /// [`collect_dcm`](Self::collect_dcm) on the blocking thread pool
    pub async fn collect_dcm_async(
        &self,
        root: PathBuf,
        root_label: String,
    ) -> SelectionResult<Vec<SelectedFile>> {
        let walker = self.clone();
        tokio::task::spawn_blocking(move || walker.collect_dcm(&root, &root_label))
            .await
            .map_err(|e| SelectionError::Internal(format!("Folder walk task failed: {}", e)))?
    }

    /// List every file under `root` the way a directory file input does
    pub fn flat_selection(&self, root: &Path) -> SelectionResult<Vec<SelectedFile>> {
        let label = folder_name(root);
        self.walk(root, &label, |_| true)
    }

    /// [`flat_selection`](Self::flat_selection) on the blocking thread pool
    pub async fn flat_selection_async(&self, root: PathBuf) -> SelectionResult<Vec<SelectedFile>> {
        let walker = self.clone();
        tokio::task::spawn_blocking(move || walker.flat_selection(&root))
            .await
            .map_err(|e| SelectionError::Internal(format!("Folder walk task failed: {}", e)))?
    }

    fn walk<F>(&self, root: &Path, root_label: &str, keep: F) -> SelectionResult<Vec<SelectedFile>>
    where
        F: Fn(&str) -> bool,
    {
        if !root.exists() {
            return Err(SelectionError::Walk {
                path: root.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "folder does not exist"),
            });
        }

        if !root.is_dir() {
            return Err(SelectionError::NotADirectory(root.to_path_buf()));
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_ignored(e));

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| walk_error(root, e))?;

            if !entry.file_type().is_file() {
                if entry.file_type().is_symlink() {
                    tracing::debug!(path = %entry.path().display(), "Skipping symlink");
                }
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            if !keep(&file_name) {
                continue;
            }

            let relative = relative_path(root, entry.path(), root_label);
            files.push(SelectedFile::from_disk(relative, entry.path()));
        }

        Ok(files)
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        self.ignore_names.iter().any(|ignored| *ignored == name)
    }
}

/// Display name of a folder: its last component, resolving `.`/`..`
pub fn folder_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .or_else(|| {
            path.canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        });

    name.unwrap_or_else(|| UNKNOWN_GROUP.to_string())
}

fn relative_path(root: &Path, path: &Path, root_label: &str) -> String {
    let stripped = path.strip_prefix(root).unwrap_or(path);
    let segments: Vec<String> = stripped
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("{}/{}", root_label, segments.join("/"))
}

fn walk_error(root: &Path, err: walkdir::Error) -> SelectionError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop detected"));

    tracing::warn!(path = %path.display(), error = %source, "Folder walk failed");
    SelectionError::Walk { path, source }
}
