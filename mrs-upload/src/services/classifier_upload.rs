//! Multipart body for `POST /run-classifier`
//!
//! The classifier takes LCModel `.COORD`/`.PRINT` outputs for the MEGA_OFF
//! sub-spectrum and, optionally, MEGA_DIFF. They arrive either as local files
//! (manual path) or as paths of outputs the service already holds from a
//! processing run.

use crate::error::{SelectionError, SelectionResult};
use crate::models::SelectedFile;
use reqwest::multipart::{Form, Part};

pub const COORD_EXTENSION: &str = ".COORD";
pub const PRINT_EXTENSION: &str = ".PRINT";

pub const COORD_OFF_FIELD: &str = "coordFilesOff";
pub const PRINT_OFF_FIELD: &str = "printFilesOff";
pub const COORD_DIFF_FIELD: &str = "coordFilesDiff";
pub const PRINT_DIFF_FIELD: &str = "printFilesDiff";
pub const USER_FOLDER_FIELD: &str = "user_folder";

const MEGA_OFF_SEGMENT: &str = "mega_off";
const MEGA_DIFF_SEGMENT: &str = "mega_diff";

/// Content of one classifier part
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierInput {
    /// Local file, sent under its base name
    File(SelectedFile),
    /// Output already on the service, sent as a text field
    ServerPath(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierPart {
    pub field: &'static str,
    pub input: ClassifierInput,
}

/// Validated classifier request
#[derive(Debug, Clone)]
pub struct ClassifierUpload {
    parts: Vec<ClassifierPart>,
    uses_mega_diff: bool,
    user_folder: Option<String>,
}

impl ClassifierUpload {
    /// Manual upload of local LCModel outputs
    ///
    /// MEGA_DIFF files are only sent when both coord and print are given.
    ///
    /// # Errors
    /// `Validation` if MEGA_OFF coord or print files are missing, or a file
    /// does not end with its field's extension (case-sensitive).
    pub fn from_files(
        coord_off: Vec<SelectedFile>,
        print_off: Vec<SelectedFile>,
        coord_diff: Vec<SelectedFile>,
        print_diff: Vec<SelectedFile>,
    ) -> SelectionResult<Self> {
        if coord_off.is_empty() || print_off.is_empty() {
            return Err(SelectionError::Validation(
                "At least MEGA_OFF .COORD and .PRINT files must be selected".to_string(),
            ));
        }

        let uses_mega_diff = !coord_diff.is_empty() && !print_diff.is_empty();
        if !uses_mega_diff && (!coord_diff.is_empty() || !print_diff.is_empty()) {
            tracing::warn!("Ignoring MEGA_DIFF files: both .COORD and .PRINT are required");
        }

        let mut groups = vec![
            (COORD_OFF_FIELD, COORD_EXTENSION, coord_off),
            (PRINT_OFF_FIELD, PRINT_EXTENSION, print_off),
        ];
        if uses_mega_diff {
            groups.push((COORD_DIFF_FIELD, COORD_EXTENSION, coord_diff));
            groups.push((PRINT_DIFF_FIELD, PRINT_EXTENSION, print_diff));
        }

        let mut parts = Vec::new();
        for (field, extension, files) in groups {
            for file in files {
                if !file.file_name().ends_with(extension) {
                    return Err(SelectionError::Validation(format!(
                        "Files for {} must end with {}",
                        field, extension
                    )));
                }
                parts.push(ClassifierPart {
                    field,
                    input: ClassifierInput::File(file),
                });
            }
        }

        Ok(Self {
            parts,
            uses_mega_diff,
            user_folder: None,
        })
    }

    /// Reuse outputs of a processing run (`lcmodel_files`)
    ///
    /// Paths are partitioned by sub-spectrum folder and extension; anything
    /// else is ignored.
    ///
    /// # Errors
    /// `Validation` if no MEGA_OFF coord or print output is listed.
    pub fn from_server_paths(
        lcmodel_files: &[String],
        user_folder: Option<String>,
    ) -> SelectionResult<Self> {
        let mut parts = Vec::new();
        let mut has = [false; 4];

        for path in lcmodel_files {
            let field = match classify_path(path) {
                Some(field) => field,
                None => {
                    tracing::debug!(path = %path, "Skipping non-classifier output");
                    continue;
                }
            };
            has[field_index(field)] = true;
            parts.push(ClassifierPart {
                field,
                input: ClassifierInput::ServerPath(path.clone()),
            });
        }

        if !has[0] || !has[1] {
            return Err(SelectionError::Validation(
                "At least MEGA_OFF .COORD and .PRINT files must be selected".to_string(),
            ));
        }

        let uses_mega_diff = has[2] && has[3];
        if !uses_mega_diff {
            parts.retain(|p| p.field == COORD_OFF_FIELD || p.field == PRINT_OFF_FIELD);
        }

        // Field order matches the manual path
        parts.sort_by_key(|p| field_index(p.field));

        Ok(Self {
            parts,
            uses_mega_diff,
            user_folder,
        })
    }

    pub fn parts(&self) -> &[ClassifierPart] {
        &self.parts
    }

    pub fn file_count(&self) -> usize {
        self.parts.len()
    }

    pub fn uses_mega_diff(&self) -> bool {
        self.uses_mega_diff
    }

    /// CSV names the classifiers write into `diagnostics/`
    ///
    /// First entry is the IDH prediction, second the 1p/19q codeletion one.
    pub fn prediction_files(&self) -> [&'static str; 2] {
        prediction_files(self.uses_mega_diff)
    }

    pub async fn into_form(self) -> std::io::Result<Form> {
        let mut form = Form::new();
        for part in self.parts {
            form = match part.input {
                ClassifierInput::File(file) => {
                    let file_name = file.file_name().to_string();
                    let bytes = file.payload.read().await?;
                    form.part(part.field, Part::bytes(bytes).file_name(file_name))
                }
                ClassifierInput::ServerPath(path) => form.text(part.field, path),
            };
        }
        if let Some(user_folder) = self.user_folder {
            form = form.text(USER_FOLDER_FIELD, user_folder);
        }
        Ok(form)
    }
}

/// Prediction CSV names for a run with or without MEGA_DIFF input
pub fn prediction_files(uses_mega_diff: bool) -> [&'static str; 2] {
    if uses_mega_diff {
        [
            "predictions_mega_off_and_diff.csv",
            "predictions_1p_19q_codeletion_mega_off_and_diff.csv",
        ]
    } else {
        [
            "predictions_mega_off.csv",
            "predictions_1p_19q_codeletion_mega_off.csv",
        ]
    }
}

fn classify_path(path: &str) -> Option<&'static str> {
    let coord = path.ends_with(COORD_EXTENSION);
    let print = path.ends_with(PRINT_EXTENSION);
    if path.contains(MEGA_OFF_SEGMENT) {
        if coord {
            return Some(COORD_OFF_FIELD);
        }
        if print {
            return Some(PRINT_OFF_FIELD);
        }
    } else if path.contains(MEGA_DIFF_SEGMENT) {
        if coord {
            return Some(COORD_DIFF_FIELD);
        }
        if print {
            return Some(PRINT_DIFF_FIELD);
        }
    }
    None
}

fn field_index(field: &str) -> usize {
    match field {
        COORD_OFF_FIELD => 0,
        PRINT_OFF_FIELD => 1,
        COORD_DIFF_FIELD => 2,
        _ => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> SelectedFile {
        SelectedFile::in_memory(name, b"lcmodel".to_vec())
    }

    #[test]
    fn test_off_only_upload() {
        let upload =
            ClassifierUpload::from_files(vec![file("p1.COORD")], vec![file("p1.PRINT")], vec![], vec![])
                .unwrap();

        assert_eq!(upload.file_count(), 2);
        assert!(!upload.uses_mega_diff());
        assert_eq!(upload.prediction_files()[0], "predictions_mega_off.csv");
    }

    #[test]
    fn test_diff_needs_both_files() {
        let upload = ClassifierUpload::from_files(
            vec![file("p1.COORD")],
            vec![file("p1.PRINT")],
            vec![file("p1_diff.COORD")],
            vec![],
        )
        .unwrap();

        assert!(!upload.uses_mega_diff());
        assert_eq!(upload.file_count(), 2);
    }

    #[test]
    fn test_diff_upload() {
        let upload = ClassifierUpload::from_files(
            vec![file("p1.COORD")],
            vec![file("p1.PRINT")],
            vec![file("p1_diff.COORD")],
            vec![file("p1_diff.PRINT")],
        )
        .unwrap();

        assert!(upload.uses_mega_diff());
        assert_eq!(
            upload.prediction_files()[1],
            "predictions_1p_19q_codeletion_mega_off_and_diff.csv"
        );
        let fields: Vec<&str> = upload.parts().iter().map(|p| p.field).collect();
        assert_eq!(
            fields,
            vec![COORD_OFF_FIELD, PRINT_OFF_FIELD, COORD_DIFF_FIELD, PRINT_DIFF_FIELD]
        );
    }

    #[test]
    fn test_missing_off_files_rejected() {
        let result = ClassifierUpload::from_files(vec![file("p1.COORD")], vec![], vec![], vec![]);

        match result {
            Err(SelectionError::Validation(msg)) => assert!(msg.contains("MEGA_OFF")),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_extension_is_case_sensitive() {
        let result =
            ClassifierUpload::from_files(vec![file("p1.coord")], vec![file("p1.PRINT")], vec![], vec![]);

        match result {
            Err(SelectionError::Validation(msg)) => {
                assert_eq!(msg, "Files for coordFilesOff must end with .COORD")
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_server_paths_are_partitioned() {
        let paths: Vec<String> = [
            "mega_diff/p1.PRINT",
            "mega_off/p1.COORD",
            "mega_off/p1.PRINT",
            "mega_off/p1.pdf",
            "mega_diff/p1.COORD",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let upload = ClassifierUpload::from_server_paths(&paths, Some("abc".to_string())).unwrap();

        assert!(upload.uses_mega_diff());
        let parts: Vec<(&str, &ClassifierInput)> =
            upload.parts().iter().map(|p| (p.field, &p.input)).collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].0, COORD_OFF_FIELD);
        assert_eq!(
            parts[3],
            (PRINT_DIFF_FIELD, &ClassifierInput::ServerPath("mega_diff/p1.PRINT".to_string()))
        );
    }

    #[test]
    fn test_server_paths_without_off_outputs_rejected() {
        let paths = vec!["mega_diff/p1.COORD".to_string(), "mega_diff/p1.PRINT".to_string()];
        assert!(ClassifierUpload::from_server_paths(&paths, None).is_err());
    }
}
