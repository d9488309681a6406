//! Upload session: per-role batch registries and their mutations
//!
//! One [`UploadSession`] replaces page-global selection state. It owns the
//! three registries (multi-folder, mono primary, mono water), the label
//! allocator and the folder walker, and publishes a
//! [`MrsEvent::SelectionChanged`] after every committed mutation.
//!
//! **Concurrency:** registries sit behind a `tokio::sync::RwLock` that is
//! never held across a walk or a picker. Folder walks complete first; the
//! label is then allocated against the live label set inside the write
//! critical section, so interleaved picks of same-named folders commit as
//! `S14` and `S14_2`.

use crate::error::SelectionResult;
use crate::models::{
    BatchRegistry, ProcessingMode, RoleSelections, SelectedFile, SelectionSummary,
};
use crate::services::folder_picker::FolderPicker;
use crate::services::folder_walker::FolderWalker;
use crate::services::group_resolver::{is_dcm_file_name, selection_group_key};
use crate::services::label_allocator::LabelAllocator;
use crate::services::submit_gate::{self, OptionState, SubmitContext, SubmitReadiness};
use chrono::Utc;
use mrs_common::config::MergePolicy;
use mrs_common::{EventBus, MrsEvent, UploadRole};
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Registries {
    multi_folder: BatchRegistry,
    mono_fid: BatchRegistry,
    mono_water: BatchRegistry,
}

impl Registries {
    fn get(&self, role: UploadRole) -> &BatchRegistry {
        match role {
            UploadRole::MultiFolder => &self.multi_folder,
            UploadRole::MonoFid => &self.mono_fid,
            UploadRole::MonoWater => &self.mono_water,
        }
    }

    fn get_mut(&mut self, role: UploadRole) -> &mut BatchRegistry {
        match role {
            UploadRole::MultiFolder => &mut self.multi_folder,
            UploadRole::MonoFid => &mut self.mono_fid,
            UploadRole::MonoWater => &mut self.mono_water,
        }
    }
}

/// File selection state for one upload form
pub struct UploadSession {
    session_id: Uuid,
    registries: RwLock<Registries>,
    allocator: LabelAllocator,
    walker: FolderWalker,
    merge_policy: MergePolicy,
    event_bus: EventBus,
}

impl UploadSession {
    pub fn new(event_bus: EventBus) -> Self {
        Self::with_policy(event_bus, MergePolicy::default())
    }

    pub fn with_policy(event_bus: EventBus, merge_policy: MergePolicy) -> Self {
        let session = Self {
            session_id: Uuid::new_v4(),
            registries: RwLock::new(Registries::default()),
            allocator: LabelAllocator::new(),
            walker: FolderWalker::new(),
            merge_policy,
            event_bus,
        };
        tracing::debug!(session_id = %session.session_id, policy = ?merge_policy, "Upload session created");
        session
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.merge_policy
    }

    /// Merge a flat/directory file-input selection into `role`'s registry
    ///
    /// **Algorithm:**
    /// 1. Drop files whose name does not end in `.dcm`
    /// 2. Group by folder label, in order of first appearance
    /// 3. New label: insert as a new batch. Existing label: replace its
    ///    contents (or append, under [`MergePolicy::Append`])
    ///
    /// Returns the labels written, in group order.
    pub async fn merge_files(&self, role: UploadRole, files: Vec<SelectedFile>) -> Vec<String> {
        let groups = group_by_label(files);
        if groups.is_empty() {
            tracing::debug!(role = %role, "Merge contained no .dcm files");
            return Vec::new();
        }

        let mut written = Vec::with_capacity(groups.len());
        let (batch_count, total_files, summary) = {
            let mut registries = self.registries.write().await;
            let registry = registries.get_mut(role);

            for (key, group) in groups {
                let count = group.len();
                if registry.contains_label(&key) {
                    match self.merge_policy {
                        MergePolicy::Replace => {
                            if let Some(previous) = registry.insert(key.clone(), group) {
                                if !previous.is_empty() {
                                    tracing::warn!(
                                        role = %role,
                                        label = %key,
                                        discarded = previous.len(),
                                        files = count,
                                        "Replaced existing batch"
                                    );
                                }
                            }
                        }
                        MergePolicy::Append => {
                            registry.append(&key, group);
                            tracing::info!(role = %role, label = %key, files = count, "Appended to batch");
                        }
                    }
                    written.push(key);
                } else {
                    let label = self
                        .allocator
                        .allocate(Some(&key), |l| registry.contains_label(l));
                    tracing::info!(role = %role, label = %label, files = count, "Added batch");
                    registry.insert(label.clone(), group);
                    written.push(label);
                }
            }

            snapshot_counts(registry)
        };

        self.publish_change(role, batch_count, total_files, summary);
        written
    }

    /// Pick a folder and add its `.dcm` files as a new batch in `role`
    ///
    /// Returns the committed label.
    ///
    /// # Errors
    /// - `UnsupportedOperation` / `Cancelled` from the picker
    /// - `Walk` / `NotADirectory` if the folder cannot be read; nothing is
    ///   committed in that case
    pub async fn add_folder(
        &self,
        role: UploadRole,
        picker: &dyn FolderPicker,
    ) -> SelectionResult<String> {
        let picked = picker.pick_folder().await?;

        let provisional = match picked.name.trim() {
            "" => self.allocator.synthesize(),
            name => name.to_string(),
        };

        let files = self
            .walker
            .collect_dcm_async(picked.path.clone(), provisional.clone())
            .await?;

        let (label, file_count, batch_count, total_files, summary) = {
            let mut registries = self.registries.write().await;
            let registry = registries.get_mut(role);

            let label = self
                .allocator
                .allocate(Some(&provisional), |l| registry.contains_label(l));
            let files = if label == provisional {
                files
            } else {
                rebase(files, &provisional, &label)
            };
            let file_count = files.len();

            registry.insert(label.clone(), files);
            let (batch_count, total_files, summary) = snapshot_counts(registry);
            (label, file_count, batch_count, total_files, summary)
        };

        tracing::info!(
            role = %role,
            label = %label,
            path = %picked.path.display(),
            files = file_count,
            "Added folder"
        );

        self.publish_change(role, batch_count, total_files, summary);
        Ok(label)
    }

    /// Walk `root` the way a directory file input would and merge the result
    pub async fn merge_directory(&self, role: UploadRole, root: PathBuf) -> SelectionResult<Vec<String>> {
        let files = self.walker.flat_selection_async(root).await?;
        Ok(self.merge_files(role, files).await)
    }

    /// Clear all three registries
    pub async fn reset(&self) {
        {
            let mut registries = self.registries.write().await;
            for role in UploadRole::ALL {
                registries.get_mut(role).clear();
            }
        }

        tracing::info!(session_id = %self.session_id, "Selections reset");
        self.event_bus.emit_lossy(MrsEvent::SelectionReset {
            timestamp: Utc::now(),
        });
    }

    /// Every file of `role`, in registry order
    pub async fn flattened(&self, role: UploadRole) -> Vec<SelectedFile> {
        self.registries.read().await.get(role).flatten()
    }

    /// Flattened lists for all roles
    pub async fn snapshot(&self) -> RoleSelections {
        let registries = self.registries.read().await;
        RoleSelections {
            multi_folder: registries.multi_folder.flatten(),
            mono_fid: registries.mono_fid.flatten(),
            mono_water: registries.mono_water.flatten(),
        }
    }

    pub async fn file_count(&self, role: UploadRole) -> usize {
        self.registries.read().await.get(role).file_count()
    }

    pub async fn summary(&self, role: UploadRole) -> SelectionSummary {
        SelectionSummary::from_registry(self.registries.read().await.get(role))
    }

    pub async fn labels(&self, role: UploadRole) -> Vec<String> {
        self.registries
            .read()
            .await
            .get(role)
            .labels()
            .map(str::to_string)
            .collect()
    }

    pub async fn batch(&self, role: UploadRole, label: &str) -> Option<Vec<SelectedFile>> {
        self.registries
            .read()
            .await
            .get(role)
            .get(label)
            .map(<[SelectedFile]>::to_vec)
    }

    /// Submit gate decision for the current selections
    ///
    /// `fallback` holds the raw flat file-input selections; a role with no
    /// batches is counted from its `.dcm` files instead.
    pub async fn submit_readiness(
        &self,
        mode: Option<ProcessingMode>,
        datatype_options: OptionState,
        condition_options: OptionState,
        fallback: &RoleSelections,
    ) -> SubmitReadiness {
        let fallback_count = |role: UploadRole| {
            fallback
                .get(role)
                .iter()
                .filter(|f| is_dcm_file_name(f.file_name()))
                .count()
        };

        let (mono, multi) = {
            let registries = self.registries.read().await;
            (
                registries.mono_fid.file_count(),
                registries.multi_folder.file_count(),
            )
        };

        submit_gate::evaluate(&SubmitContext {
            mode,
            datatype_options,
            condition_options,
            mono_count: submit_gate::effective_count(mono, fallback_count(UploadRole::MonoFid)),
            multi_count: submit_gate::effective_count(
                multi,
                fallback_count(UploadRole::MultiFolder),
            ),
        })
    }

    fn publish_change(&self, role: UploadRole, batch_count: usize, total_files: usize, summary: String) {
        self.event_bus.emit_lossy(MrsEvent::SelectionChanged {
            role,
            batch_count,
            total_files,
            summary,
            timestamp: Utc::now(),
        });
    }
}

/// `.dcm` files grouped by folder label, groups in first-appearance order
fn group_by_label(files: Vec<SelectedFile>) -> Vec<(String, Vec<SelectedFile>)> {
    let mut groups: Vec<(String, Vec<SelectedFile>)> = Vec::new();

    for file in files {
        if !is_dcm_file_name(file.file_name()) {
            tracing::debug!(path = %file.relative_path, "Skipping non-.dcm file");
            continue;
        }

        let key = selection_group_key(&file.relative_path);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.push(file),
            None => groups.push((key, vec![file])),
        }
    }

    groups
}

fn snapshot_counts(registry: &BatchRegistry) -> (usize, usize, String) {
    (
        registry.len(),
        registry.file_count(),
        SelectionSummary::from_registry(registry).to_string(),
    )
}

/// Swap the leading `from/` segment of each relative path for `to/`
fn rebase(files: Vec<SelectedFile>, from: &str, to: &str) -> Vec<SelectedFile> {
    let prefix = format!("{}/", from);
    files
        .into_iter()
        .map(|mut file| {
            if let Some(rest) = file.relative_path.strip_prefix(&prefix) {
                file.relative_path = format!("{}/{}", to, rest);
            }
            file
        })
        .collect()
}
