//! Processing mode and per-role file lists handed to the upload step

use super::SelectedFile;
use mrs_common::UploadRole;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which upload path the user has chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Single subject: primary signal plus optional water reference
    Mono,
    /// One directory tree per subject
    Multi,
}

impl ProcessingMode {
    /// Roles whose files are sent in this mode
    pub fn roles(&self) -> &'static [UploadRole] {
        match self {
            ProcessingMode::Mono => &[UploadRole::MonoFid, UploadRole::MonoWater],
            ProcessingMode::Multi => &[UploadRole::MultiFolder],
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingMode::Mono => f.write_str("MONO"),
            ProcessingMode::Multi => f.write_str("MULTI"),
        }
    }
}

/// Flattened file list for each role
///
/// Used both for the session's batch registries and for the raw flat
/// file-input selections that serve as fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSelections {
    pub multi_folder: Vec<SelectedFile>,
    pub mono_fid: Vec<SelectedFile>,
    pub mono_water: Vec<SelectedFile>,
}

impl RoleSelections {
    pub fn get(&self, role: UploadRole) -> &[SelectedFile] {
        match role {
            UploadRole::MultiFolder => &self.multi_folder,
            UploadRole::MonoFid => &self.mono_fid,
            UploadRole::MonoWater => &self.mono_water,
        }
    }
}
