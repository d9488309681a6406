//! mrs-upload library interface
//!
//! File selection core (batch registries, grouping, label allocation,
//! flattening) and the client for the MRS processing/classifier service.
//! The binary in `main.rs` is one front end; integration tests drive the
//! same API.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod session;

pub use crate::error::{SelectionError, SelectionResult};
pub use crate::session::UploadSession;
