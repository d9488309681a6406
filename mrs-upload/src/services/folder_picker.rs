//! Platform folder-picker capability
//!
//! The selection core only needs "give me a folder"; how it is chosen
//! (command-line paths, native dialog) is up to the front end. A platform
//! without a picker reports [`SelectionError::UnsupportedOperation`] and the
//! caller falls back to a flat directory selection.

use crate::error::{SelectionError, SelectionResult};
use crate::services::folder_walker::folder_name;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

/// A folder chosen through a picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedFolder {
    /// Folder's own name (becomes the batch label)
    pub name: String,
    /// Location to walk
    pub path: PathBuf,
}

impl PickedFolder {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: folder_name(&path),
            path,
        }
    }
}

/// Folder picker capability
///
/// Futures are not required to be `Send`: native dialogs on some platforms
/// must stay on the thread that opened them.
#[async_trait::async_trait(?Send)]
pub trait FolderPicker {
    /// Ask the user for one folder
    ///
    /// # Errors
    /// - `UnsupportedOperation` if the platform has no picker
    /// - `Cancelled` if the user dismissed it
    async fn pick_folder(&self) -> SelectionResult<PickedFolder>;
}

/// Picker for platforms without the capability
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedFolderPicker;

#[async_trait::async_trait(?Send)]
impl FolderPicker for UnsupportedFolderPicker {
    async fn pick_folder(&self) -> SelectionResult<PickedFolder> {
        Err(SelectionError::UnsupportedOperation)
    }
}

/// Picker that hands out folders supplied up front (e.g. CLI arguments)
///
/// Each call yields the next folder; an exhausted queue behaves like a
/// dismissed dialog.
#[derive(Debug, Default)]
pub struct QueuedFolderPicker {
    queue: Mutex<VecDeque<PathBuf>>,
}

impl QueuedFolderPicker {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            queue: Mutex::new(paths.into_iter().map(Into::into).collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait(?Send)]
impl FolderPicker for QueuedFolderPicker {
    async fn pick_folder(&self) -> SelectionResult<PickedFolder> {
        let next = self
            .queue
            .lock()
            .map_err(|_| SelectionError::Internal("Folder queue poisoned".to_string()))?
            .pop_front();

        let path = next.ok_or(SelectionError::Cancelled)?;
        if path.exists() && !path.is_dir() {
            return Err(SelectionError::NotADirectory(path));
        }

        Ok(PickedFolder::from_path(path))
    }
}

/// Native folder dialog
#[cfg(feature = "native-dialog")]
#[derive(Debug, Clone)]
pub struct NativeFolderPicker {
    title: String,
}

#[cfg(feature = "native-dialog")]
impl NativeFolderPicker {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }
}

#[cfg(feature = "native-dialog")]
#[async_trait::async_trait(?Send)]
impl FolderPicker for NativeFolderPicker {
    async fn pick_folder(&self) -> SelectionResult<PickedFolder> {
        let handle = rfd::AsyncFileDialog::new()
            .set_title(self.title.as_str())
            .pick_folder()
            .await
            .ok_or(SelectionError::Cancelled)?;

        Ok(PickedFolder {
            name: handle.file_name(),
            path: handle.path().to_path_buf(),
        })
    }
}
