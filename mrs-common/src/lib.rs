//! # MRS Common Library
//!
//! Shared code for the MRS upload client including:
//! - Error types
//! - Bootstrap configuration loading (TOML + environment)
//! - Selection/upload event types and the EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, MrsEvent, UploadRole};
