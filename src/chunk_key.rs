//! Chunk key encodings: chunk coordinates to store keys

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Separator between chunk key components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkKeySeparator {
    #[serde(rename = "/")]
    Slash,
    #[serde(rename = ".")]
    Dot,
}

impl ChunkKeySeparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKeySeparator::Slash => "/",
            ChunkKeySeparator::Dot => ".",
        }
    }
}

fn slash() -> ChunkKeySeparator {
    ChunkKeySeparator::Slash
}

fn dot() -> ChunkKeySeparator {
    ChunkKeySeparator::Dot
}

/// Rule mapping a chunk coordinate to a store key
///
/// Serialised as `{"name": ..., "configuration": {"separator": ...}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "name", content = "configuration", rename_all = "lowercase")]
pub enum ChunkKeyEncoding {
    /// `c/1/2/3`; the rank-0 chunk is `c`
    Default {
        #[serde(default = "slash")]
        separator: ChunkKeySeparator,
    },
    /// `1.2.3`; the rank-0 chunk is `0`
    V2 {
        #[serde(default = "dot")]
        separator: ChunkKeySeparator,
    },
}

impl Default for ChunkKeyEncoding {
    fn default() -> Self {
        ChunkKeyEncoding::Default {
            separator: ChunkKeySeparator::Slash,
        }
    }
}

impl ChunkKeyEncoding {
    const DEFAULT_PREFIX: &'static str = "c";

    pub fn v2() -> Self {
        ChunkKeyEncoding::V2 {
            separator: ChunkKeySeparator::Dot,
        }
    }

    /// The store key of a chunk, relative to its array's node path.
    ///
    /// Identical coordinates always produce identical keys and distinct
    /// coordinates of the same rank never collide.
    pub fn key_for(&self, chunk_coords: &[u64]) -> String {
        match self {
            ChunkKeyEncoding::Default { separator } => {
                std::iter::once(Self::DEFAULT_PREFIX.to_string())
                    .chain(chunk_coords.iter().map(u64::to_string))
                    .join(separator.as_str())
            }
            ChunkKeyEncoding::V2 { separator } => {
                if chunk_coords.is_empty() {
                    "0".to_string()
                } else {
                    chunk_coords.iter().join(separator.as_str())
                }
            }
        }
    }
}
