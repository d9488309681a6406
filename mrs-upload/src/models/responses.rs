//! Response bodies of the processing/classifier service

use serde::{Deserialize, Serialize};

/// Prefix the service puts in front of per-run working folders
const USER_FOLDER_PREFIX: &str = "users/";

/// Strip the `users/` prefix from a server working folder
pub fn normalize_user_folder(folder: &str) -> String {
    folder
        .strip_prefix(USER_FOLDER_PREFIX)
        .unwrap_or(folder)
        .to_string()
}

/// Working folder in the `users/<id>` form the service uses on disk
pub fn server_user_folder(folder: &str) -> String {
    format!("{}{}", USER_FOLDER_PREFIX, normalize_user_folder(folder))
}

/// `POST /run-processing` success body
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProcessingResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub user_folder: Option<String>,
    /// Pipeline stdout
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub logs: Option<String>,
    /// PDF paths relative to the LCModel output root (`mega_off/x.pdf`)
    #[serde(default)]
    pub pdfs: Vec<String>,
    /// LCModel result files (.COORD/.PRINT) usable by the classifier
    #[serde(default)]
    pub lcmodel_files: Vec<String>,
    /// Main HTML report path, if one was generated
    #[serde(default)]
    pub report: Option<String>,
    #[serde(default)]
    pub report_files: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// PDFs split by MEGA-PRESS sub-spectrum
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfGroups {
    pub mega_diff: Option<String>,
    pub mega_off: Option<String>,
    pub other: Vec<String>,
}

impl ProcessingResponse {
    pub fn user_folder(&self) -> Option<String> {
        self.user_folder.as_deref().map(normalize_user_folder)
    }

    /// Real PDF entries; the service sends a placeholder string when none exist
    pub fn pdf_paths(&self) -> impl Iterator<Item = &str> {
        self.pdfs
            .iter()
            .map(String::as_str)
            .filter(|p| p.to_ascii_lowercase().ends_with(".pdf"))
    }

    /// First `mega_diff/` and `mega_off/` PDFs, everything else in order
    pub fn pdf_groups(&self) -> PdfGroups {
        let mut groups = PdfGroups::default();
        for pdf in self.pdf_paths() {
            if pdf.starts_with("mega_diff/") {
                groups.mega_diff.get_or_insert_with(|| pdf.to_string());
            } else if pdf.starts_with("mega_off/") {
                groups.mega_off.get_or_insert_with(|| pdf.to_string());
            } else {
                groups.other.push(pdf.to_string());
            }
        }
        groups
    }

    /// File name of the HTML report
    pub fn report_file_name(&self) -> Option<&str> {
        self.report.as_deref().and_then(|r| r.rsplit('/').next())
    }
}

/// `POST /run-classifier` body (both success and error)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClassifierResponse {
    #[serde(default)]
    pub user_folder: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ClassifierResponse {
    pub fn user_folder(&self) -> Option<String> {
        self.user_folder.as_deref().map(normalize_user_folder)
    }
}

/// `POST /run-second-classifier` body (1p/19q codeletion)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SecondClassifierResponse {
    #[serde(default)]
    pub status: Option<String>,
    /// Set when the run was skipped (no IDH-mutant cases)
    #[serde(default)]
    pub message: Option<String>,
    /// CSV path relative to the service's user root
    #[serde(default)]
    pub predictions_csv: Option<String>,
    #[serde(default)]
    pub user_folder: Option<String>,
}

/// `POST /analysis-plots` body
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AnalysisPlotsResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub plots: PlotUrls,
}

/// Plot URLs served by the service (relative to its base URL)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlotUrls {
    #[serde(default)]
    pub heatmap_plot: Option<String>,
    #[serde(default)]
    pub ratio_plot: Option<String>,
    #[serde(default)]
    pub spectra_plot: Option<String>,
    #[serde(default)]
    pub concentration_plot: Vec<String>,
}

impl PlotUrls {
    /// Every available plot URL
    pub fn all(&self) -> Vec<&str> {
        [&self.heatmap_plot, &self.ratio_plot, &self.spectra_plot]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .chain(self.concentration_plot.iter().map(String::as_str))
            .collect()
    }
}

/// Error body shared by all endpoints (`message`/`error` + optional logs)
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RemoteErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub logs: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}
