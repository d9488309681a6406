//! Folder label derivation from relative paths
//!
//! Examples:
//! - `"S14/file.dcm"` → `"S14"`
//! - `"parent/S14/file.dcm"` (picked the parent folder) → `"parent/S14"`
//! - `"S14/sub/deeper/file.dcm"` → `"S14/sub"` (best effort, two levels)
//! - `"file.dcm"` → `"(unknown)"`

/// Extension (lower case, with dot) of the files the pipeline accepts
pub const DATA_FILE_EXTENSION: &str = ".dcm";

/// Label used when a path carries no folder information
pub const UNKNOWN_GROUP: &str = "(unknown)";

/// Case-insensitive `.dcm` suffix check
pub fn is_dcm_file_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(DATA_FILE_EXTENSION)
}

/// Derive the folder label a file belongs to
///
/// Pure and total: empty segments are ignored, and anything without a
/// folder component maps to [`UNKNOWN_GROUP`].
pub fn selection_group_key(relative_path: &str) -> String {
    let mut parts = relative_path.split('/').filter(|s| !s.is_empty());

    let (Some(first), Some(second)) = (parts.next(), parts.next()) else {
        return UNKNOWN_GROUP.to_string();
    };

    if parts.next().is_none() || is_dcm_file_name(second) {
        return first.to_string();
    }

    format!("{}/{}", first, second)
}
