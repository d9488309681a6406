//! Data models for mrs-upload
//!
//! - Selected files and the per-role batch registries
//! - Status summaries
//! - Remote service response bodies

pub mod batch_registry;
pub mod responses;
pub mod selected_file;
pub mod selection;
pub mod summary;

pub use batch_registry::{Batch, BatchRegistry};
pub use responses::{
    normalize_user_folder, server_user_folder, AnalysisPlotsResponse, ClassifierResponse,
    PdfGroups, PlotUrls, ProcessingResponse, SecondClassifierResponse,
};
pub use selected_file::{FilePayload, SelectedFile};
pub use selection::{ProcessingMode, RoleSelections};
pub use summary::SelectionSummary;
