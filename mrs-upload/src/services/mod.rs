//! Service modules for the upload workflow
//!
//! Selection side: grouping, label allocation, folder walking and picking.
//! Submission side: submit gate, request assembly, service client.

pub mod classifier_upload;
pub mod folder_picker;
pub mod folder_walker;
pub mod group_resolver;
pub mod label_allocator;
pub mod pipeline_client;
pub mod submit_gate;
pub mod upload_assembler;

pub use classifier_upload::{ClassifierInput, ClassifierPart, ClassifierUpload};
pub use folder_picker::{FolderPicker, PickedFolder, QueuedFolderPicker, UnsupportedFolderPicker};
pub use folder_walker::FolderWalker;
pub use group_resolver::selection_group_key;
pub use label_allocator::LabelAllocator;
pub use pipeline_client::{ClientError, PipelineClient};
pub use submit_gate::{OptionState, SubmitContext, SubmitReadiness};
pub use upload_assembler::{UploadAssembler, UploadPart, UploadPlan};

#[cfg(feature = "native-dialog")]
pub use folder_picker::NativeFolderPicker;
