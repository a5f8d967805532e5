//! ndstore - chunked, compressed N-dimensional array storage
//!
//! Large N-dimensional arrays are split into a regular grid of chunks. Each
//! chunk is encoded through a codec pipeline and stored under its own key in
//! a key-value [`Store`]. Reads and writes of arbitrary selections are
//! decomposed into per-chunk operations, so only the chunks a request touches
//! are ever loaded.
//!
//! # Features
//!
//! - Arrays of any rank with boolean, integer and floating point elements
//! - Outer-product (slices, indices, masks) and vectorized point selections
//! - Codecs: `bytes`, `transpose`, `gzip`, `zlib`, `zstd`, `crc32c`, plus the
//!   numcodecs `delta`, `shuffle`, `fixedscaleoffset`, `astype`, `crc32` and
//!   `adler32`
//! - In-memory and local filesystem stores (implement [`Store`] for others)
//! - Async I/O throughout, with a blocking facade in [`sync`]
//!
//! # Example
//!
//! ```rust,no_run
//! use ndstore::{Array, ArrayBuffer, ArrayConfig, ArrayMetadata, DataType, Selection};
//!
//! # async fn example() -> ndstore::Result<()> {
//! let store = ndstore::open_store("file:///data/survey")?;
//! let metadata = ArrayMetadata::builder(vec![1000, 800], vec![100, 100], DataType::Float32)
//!     .build()?;
//! let array = Array::create(store, "velocity", metadata, ArrayConfig::default()).await?;
//!
//! let block = ArrayBuffer::from_elements(vec![2, 3], &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0])?;
//! array.write(&Selection::ranges(&[10..12, 20..23]), &block).await?;
//! let data = array.read(&Selection::ranges(&[0..20, 0..40])).await?;
//! # Ok(())
//! # }
//! ```

pub mod array;
pub mod buffer;
pub mod chunk_grid;
pub mod chunk_key;
pub mod codec;
pub mod compression;
pub mod config;
pub mod error;
pub mod filters;
pub mod group;
pub mod indexer;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod selection;
pub mod store;
pub mod sync;
pub mod types;
pub mod utils;

// Re-exports
pub use array::{Array, ArrayInfo};
pub use buffer::ArrayBuffer;
pub use chunk_grid::ChunkGrid;
pub use chunk_key::{ChunkKeyEncoding, ChunkKeySeparator};
pub use codec::{Codec, CodecDescriptor, CodecRegistry};
pub use config::ArrayConfig;
pub use error::{ArrayError, Result};
pub use group::{Group, Node};
pub use indexer::{decompose, ChunkOperation, ChunkOperations, RegionSelection};
pub use logging::LoggingStore;
pub use metadata::{ArrayMetadata, GroupMetadata, NodeMetadata};
pub use pipeline::CodecPipeline;
pub use selection::{DimSelector, Selection};
pub use store::{open_store, ByteRange, FilesystemStore, MemoryStore, Store};
pub use sync::SyncArray;
pub use types::{DataType, Element, Endianness, FillValue};

/// Library version
pub const NDSTORE_VERSION: &str = env!("CARGO_PKG_VERSION");
