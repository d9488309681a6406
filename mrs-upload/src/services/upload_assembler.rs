//! Multipart body assembly for `POST /run-processing`
//!
//! The plan is built synchronously from the flattened selections (so it can
//! be inspected and tested), then turned into a `reqwest` form by reading
//! each payload.
//!
//! Every part uses the file's relative path as its filename, which keeps the
//! folder-derived naming and avoids same-basename collisions between
//! different source folders.

use crate::models::{FilePayload, ProcessingMode, RoleSelections, SelectedFile};
use crate::services::group_resolver::is_dcm_file_name;
use mrs_common::{Error, Result, UploadRole};
use reqwest::multipart::{Form, Part};

/// Scalar field carrying the acquisition type
pub const DATATYPE_FIELD: &str = "datatype";

/// One file part of the request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    pub field: &'static str,
    pub file_name: String,
    pub payload: FilePayload,
}

/// Fully resolved request body, before payloads are read
#[derive(Debug, Clone)]
pub struct UploadPlan {
    pub mode: ProcessingMode,
    pub datatype: String,
    pub parts: Vec<UploadPart>,
}

impl UploadPlan {
    pub fn file_count(&self) -> usize {
        self.parts.len()
    }

    /// Parts sent under `field`
    pub fn parts_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a UploadPart> + 'a {
        self.parts.iter().filter(move |p| p.field == field)
    }

    /// Read every payload and build the multipart form
    ///
    /// File parts come first, in plan order, followed by `datatype`.
    pub async fn into_form(self) -> std::io::Result<Form> {
        let mut form = Form::new();
        for part in self.parts {
            let bytes = part.payload.read().await?;
            form = form.part(part.field, Part::bytes(bytes).file_name(part.file_name));
        }
        Ok(form.text(DATATYPE_FIELD, self.datatype))
    }
}

/// Builds [`UploadPlan`]s for the selected processing mode
#[derive(Debug, Clone)]
pub struct UploadAssembler {
    datatype: String,
}

impl UploadAssembler {
    pub fn new(datatype: impl Into<String>) -> Self {
        Self {
            datatype: datatype.into(),
        }
    }

    pub fn datatype(&self) -> &str {
        &self.datatype
    }

    /// Assemble the request body for `mode`
    ///
    /// **Algorithm:**
    /// 1. Pick the roles the mode sends (mono: primary + water, multi: directory)
    /// 2. For each role use the session's flattened list; if it is empty, use
    ///    the fallback flat selection filtered to `.dcm`
    /// 3. Emit one part per file under the role's field name
    ///
    /// # Errors
    /// `InvalidInput` if no mode is selected. Gating on file counts is the
    /// submit gate's job; an empty plan is still assembled.
    pub fn assemble(
        &self,
        mode: Option<ProcessingMode>,
        selections: &RoleSelections,
        fallback: &RoleSelections,
    ) -> Result<UploadPlan> {
        let mode = mode.ok_or_else(|| {
            Error::InvalidInput("No processing mode selected (choose MONO or MULTI)".to_string())
        })?;

        let mut parts = Vec::new();
        for &role in mode.roles() {
            for file in files_for_role(role, selections, fallback) {
                parts.push(UploadPart {
                    field: role.form_field(),
                    file_name: file.relative_path,
                    payload: file.payload,
                });
            }
        }

        if parts.is_empty() {
            tracing::warn!(mode = %mode, "Assembled upload without any files");
        } else {
            tracing::info!(mode = %mode, files = parts.len(), datatype = %self.datatype, "Assembled upload");
        }

        Ok(UploadPlan {
            mode,
            datatype: self.datatype.clone(),
            parts,
        })
    }
}

fn files_for_role(
    role: UploadRole,
    selections: &RoleSelections,
    fallback: &RoleSelections,
) -> Vec<SelectedFile> {
    let selected = selections.get(role);
    if !selected.is_empty() {
        return selected.to_vec();
    }

    fallback
        .get(role)
        .iter()
        .filter(|f| is_dcm_file_name(f.file_name()))
        .cloned()
        .collect()
}
