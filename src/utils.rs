//! Utility functions

use crate::error::{ArrayError, Result};
use crate::metadata::METADATA_KEY;

/// Normalize a node path: no leading, trailing or repeated `/`.
///
/// The root node is the empty path.
pub fn normalize_path(path: &str) -> Result<String> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.iter().any(|&p| p == "." || p == "..") {
        return Err(ArrayError::validation(format!(
            "node path {path:?} contains a relative component"
        )));
    }
    Ok(parts.join("/"))
}

/// Join a store key onto a normalized node path
pub fn join_key(node_path: &str, key: &str) -> String {
    if node_path.is_empty() {
        key.to_string()
    } else {
        format!("{node_path}/{key}")
    }
}

/// Key of the metadata document of the node at `node_path`
pub fn metadata_key(node_path: &str) -> String {
    join_key(node_path, METADATA_KEY)
}

/// Prefix under which every key of the node at `node_path` lives
pub fn node_prefix(node_path: &str) -> String {
    join_key(node_path, "")
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
