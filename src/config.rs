//! Runtime configuration passed explicitly to array handles

use crate::types::Endianness;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of chunk operations in flight per read/write call
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Configuration for array reads and writes
///
/// There is no process-wide configuration; every [`crate::Array`] is opened
/// or created with one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayConfig {
    /// Maximum chunk operations in flight within one call
    pub concurrency: usize,

    /// Verify checksums written by checksum codecs when decoding
    pub validate_checksums: bool,

    /// Store chunks whose contents are entirely the fill value.
    /// When false such chunks are deleted from the store instead.
    pub store_empty_chunks: bool,

    /// Byte order given to an implicitly inserted `bytes` codec
    pub default_endian: Endianness,

    /// Upper bound on blocking calls made through [`crate::sync`]
    pub sync_timeout: Option<Duration>,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            validate_checksums: true,
            store_empty_chunks: false,
            default_endian: Endianness::Little,
            sync_timeout: None,
        }
    }
}

impl ArrayConfig {
    /// Set the per-call concurrency limit (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_validate_checksums(mut self, validate: bool) -> Self {
        self.validate_checksums = validate;
        self
    }

    pub fn with_store_empty_chunks(mut self, store_empty_chunks: bool) -> Self {
        self.store_empty_chunks = store_empty_chunks;
        self
    }

    pub fn with_default_endian(mut self, endian: Endianness) -> Self {
        self.default_endian = endian;
        self
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = Some(timeout);
        self
    }
}
