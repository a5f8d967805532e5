//! Array access - main API for reading and writing chunked arrays

use crate::buffer::ArrayBuffer;
use crate::chunk_grid::ChunkGrid;
use crate::codec::{CodecOptions, CodecRegistry};
use crate::config::ArrayConfig;
use crate::error::{ArrayError, Result};
use crate::group::ensure_parent_groups;
use crate::indexer::{decompose_normalized, ChunkOperation};
use crate::metadata::{ArrayMetadata, NodeMetadata};
use crate::pipeline::CodecPipeline;
use crate::selection::Selection;
use crate::store::Store;
use crate::types::{DataType, Element};
use crate::utils::{format_bytes, join_key, metadata_key, node_prefix, normalize_path};
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use ndarray::ArrayD;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-chunk-key async locks serializing read-modify-write cycles
#[derive(Debug, Clone, Default)]
pub(crate) struct ChunkLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

pub(crate) struct ChunkLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl ChunkLocks {
    pub(crate) async fn lock(&self, key: &str) -> ChunkLockGuard {
        let mutex = self
            .locks
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone();
        ChunkLockGuard {
            guard: Some(mutex.lock_owned().await),
            key: key.to_string(),
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

impl Drop for ChunkLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock();
        // only the map holds the mutex: nobody is waiting on it
        if locks
            .get(&self.key)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

/// Handle to a chunked array in a store
///
/// Clones share one set of chunk locks, so partial writes through them never
/// lose each other's updates. Handles from separate `create`/`open` calls (or
/// other processes) do not share locks.
#[derive(Clone)]
pub struct Array {
    store: Arc<dyn Store>,
    path: String,
    metadata: Arc<ArrayMetadata>,
    pipeline: Arc<CodecPipeline>,
    registry: CodecRegistry,
    config: ArrayConfig,
    locks: ChunkLocks,
}

impl std::fmt::Debug for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Array")
            .field("path", &self.path)
            .field("metadata", &self.metadata)
            .field("config", &self.config)
            .finish()
    }
}

impl Array {
    fn from_parts(
        store: Arc<dyn Store>,
        path: String,
        metadata: ArrayMetadata,
        registry: CodecRegistry,
        config: ArrayConfig,
    ) -> Result<Self> {
        let pipeline = metadata.codec_pipeline(&registry)?;
        Ok(Self {
            store,
            path,
            metadata: Arc::new(metadata),
            pipeline: Arc::new(pipeline),
            registry,
            config,
            locks: ChunkLocks::default(),
        })
    }

    /// Create a new array at `path`, failing if a node already exists there
    pub async fn create(
        store: Arc<dyn Store>,
        path: &str,
        metadata: ArrayMetadata,
        config: ArrayConfig,
    ) -> Result<Self> {
        Self::create_with_registry(store, path, metadata, config, CodecRegistry::default()).await
    }

    pub async fn create_with_registry(
        store: Arc<dyn Store>,
        path: &str,
        metadata: ArrayMetadata,
        config: ArrayConfig,
        registry: CodecRegistry,
    ) -> Result<Self> {
        let path = normalize_path(path)?;
        let array = Self::from_parts(store, path, metadata, registry, config)?;
        ensure_parent_groups(array.store.as_ref(), &array.path).await?;
        let key = metadata_key(&array.path);
        let document = Bytes::from(array.metadata.to_json()?);
        if !array.store.set_if_absent(&key, document).await? {
            return Err(ArrayError::AlreadyExists(format!(
                "a node already exists at {:?}",
                array.path
            )));
        }
        log::debug!("Created array {:?}: {}", array.path, array.info_line());
        Ok(array)
    }

    /// Open an existing array
    pub async fn open(store: Arc<dyn Store>, path: &str, config: ArrayConfig) -> Result<Self> {
        Self::open_with_registry(store, path, config, CodecRegistry::default()).await
    }

    pub async fn open_with_registry(
        store: Arc<dyn Store>,
        path: &str,
        config: ArrayConfig,
        registry: CodecRegistry,
    ) -> Result<Self> {
        let path = normalize_path(path)?;
        let key = metadata_key(&path);
        let document = store
            .get(&key)
            .await?
            .ok_or_else(|| ArrayError::NotFound(format!("no array at {path:?}")))?;
        match NodeMetadata::from_json(&document, &registry)? {
            NodeMetadata::Array(metadata) => {
                Self::from_parts(store, path, metadata, registry, config)
            }
            NodeMetadata::Group(_) => Err(ArrayError::validation(format!(
                "node at {path:?} is a group, not an array"
            ))),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    pub fn config(&self) -> &ArrayConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn shape(&self) -> &[u64] {
        self.metadata.shape()
    }

    pub fn data_type(&self) -> DataType {
        self.metadata.data_type()
    }

    pub fn chunk_grid(&self) -> ChunkGrid {
        self.metadata.chunk_grid()
    }

    /// Store key of the chunk at `chunk_coords`
    pub fn chunk_key(&self, chunk_coords: &[u64]) -> String {
        join_key(
            &self.path,
            &self.metadata.chunk_key_encoding().key_for(chunk_coords),
        )
    }

    fn codec_options(&self) -> CodecOptions {
        CodecOptions {
            validate_checksums: self.config.validate_checksums,
        }
    }

    fn fill_chunk(&self) -> ArrayBuffer {
        ArrayBuffer::filled(
            self.metadata.data_type(),
            self.metadata.chunk_shape().to_vec(),
            self.metadata.fill_value(),
        )
    }

    fn check_chunk_coords(&self, chunk_coords: &[u64]) -> Result<()> {
        if !self.chunk_grid().is_valid_chunk(chunk_coords) {
            return Err(ArrayError::index(format!(
                "chunk {:?} is outside the grid {:?}",
                chunk_coords,
                self.chunk_grid().grid_shape()
            )));
        }
        Ok(())
    }

    async fn retrieve_encoded_chunk(&self, key: &str) -> Result<Option<ArrayBuffer>> {
        match self.store.get(key).await? {
            Some(bytes) => {
                log::debug!("Decoding chunk {key} ({} bytes)", bytes.len());
                self.pipeline.decode(&bytes, &self.codec_options()).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Decoded chunk at `chunk_coords`, or `None` if it is not stored
    pub async fn retrieve_chunk_if_exists(
        &self,
        chunk_coords: &[u64],
    ) -> Result<Option<ArrayBuffer>> {
        self.check_chunk_coords(chunk_coords)?;
        self.retrieve_encoded_chunk(&self.chunk_key(chunk_coords)).await
    }

    /// Decoded chunk at `chunk_coords`; a chunk that is not stored reads as fill value
    pub async fn retrieve_chunk(&self, chunk_coords: &[u64]) -> Result<ArrayBuffer> {
        Ok(self
            .retrieve_chunk_if_exists(chunk_coords)
            .await?
            .unwrap_or_else(|| self.fill_chunk()))
    }

    /// Encode and store (or erase, if it is all fill value) a full chunk.
    /// The caller holds the chunk's lock.
    async fn put_chunk(&self, key: &str, chunk: ArrayBuffer) -> Result<()> {
        if !self.config.store_empty_chunks && chunk.is_fill(self.metadata.fill_value()) {
            log::debug!("Chunk {key} is empty, erasing");
            return self.store.delete(key).await;
        }
        let encoded = self.pipeline.encode(chunk)?;
        log::debug!("Storing chunk {key} ({} bytes)", encoded.len());
        self.store.set(key, Bytes::from(encoded)).await
    }

    /// Replace the chunk at `chunk_coords` with `chunk`, which must have the full chunk shape
    pub async fn store_chunk(&self, chunk_coords: &[u64], chunk: ArrayBuffer) -> Result<()> {
        self.check_chunk_coords(chunk_coords)?;
        if chunk.shape() != self.metadata.chunk_shape() || chunk.data_type() != self.data_type() {
            return Err(ArrayError::validation(format!(
                "chunk of shape {:?} and type {} does not match chunk shape {:?} and type {}",
                chunk.shape(),
                chunk.data_type(),
                self.metadata.chunk_shape(),
                self.data_type()
            )));
        }
        let key = self.chunk_key(chunk_coords);
        let _lock = self.locks.lock(&key).await;
        self.put_chunk(&key, chunk).await
    }

    /// Remove the chunk at `chunk_coords`; its region reads as fill value afterwards
    pub async fn erase_chunk(&self, chunk_coords: &[u64]) -> Result<()> {
        self.check_chunk_coords(chunk_coords)?;
        let key = self.chunk_key(chunk_coords);
        let _lock = self.locks.lock(&key).await;
        self.store.delete(&key).await
    }

    /// Keys of every chunk currently stored
    pub async fn stored_chunk_keys(&self) -> Result<Vec<String>> {
        let prefix = node_prefix(&self.path);
        let metadata = metadata_key(&self.path);
        let keys: Vec<String> = self.store.list_prefix(&prefix).try_collect().await?;
        Ok(keys.into_iter().filter(|k| *k != metadata).collect())
    }

    /// Read the elements of `selection`
    ///
    /// Dimensions selected with an integer index are dropped from the output
    /// shape. Positions in chunks that are not stored hold the fill value.
    /// The first failing chunk aborts the read.
    pub async fn read(&self, selection: &Selection) -> Result<ArrayBuffer> {
        let normalized = selection.normalize(self.shape())?;
        let full_shape = normalized.full_output_shape();
        let chunk_shape = self.metadata.chunk_shape();
        let mut out = ArrayBuffer::filled(
            self.data_type(),
            full_shape.clone(),
            self.metadata.fill_value(),
        );

        let operations = decompose_normalized(&normalized, chunk_shape);
        let mut chunks = stream::iter(operations)
            .map(|op| async move {
                let chunk = self
                    .retrieve_encoded_chunk(&self.chunk_key(&op.chunk_coords))
                    .await?;
                Ok::<_, ArrayError>((op, chunk))
            })
            .buffer_unordered(self.config.concurrency.max(1));

        let mut count = 0usize;
        while let Some(result) = chunks.next().await {
            let (op, chunk) = result?;
            count += 1;
            if let Some(chunk) = chunk {
                chunk.copy_elements_to(
                    op.chunk_selection.offsets(chunk_shape),
                    &mut out,
                    op.out_selection.offsets(&full_shape),
                )?;
            }
        }
        log::debug!(
            "Read {} elements of {:?} from {} chunks",
            out.num_elements(),
            self.path,
            count
        );
        out.reshape(normalized.output_shape())
    }

    /// Read the elements of `selection` into an ndarray
    pub async fn read_ndarray<T: Element>(&self, selection: &Selection) -> Result<ArrayD<T>> {
        self.read(selection).await?.to_ndarray()
    }

    async fn write_operation(
        &self,
        op: ChunkOperation,
        data: &ArrayBuffer,
        data_shape: &[u64],
    ) -> Result<()> {
        let key = self.chunk_key(&op.chunk_coords);
        let in_bounds = self.chunk_grid().chunk_in_bounds_shape(&op.chunk_coords);
        let chunk_shape = self.metadata.chunk_shape();

        let _lock = self.locks.lock(&key).await;
        let mut chunk = if op.chunk_selection.covers(&in_bounds) {
            self.fill_chunk()
        } else {
            self.retrieve_encoded_chunk(&key)
                .await?
                .unwrap_or_else(|| self.fill_chunk())
        };
        data.copy_elements_to(
            op.out_selection.offsets(data_shape),
            &mut chunk,
            op.chunk_selection.offsets(chunk_shape),
        )?;
        self.put_chunk(&key, chunk).await
    }

    /// Write `data` into the elements of `selection`
    ///
    /// `data` has the selection's output shape, with or without the
    /// dimensions selected by an integer index. Every chunk operation runs to
    /// completion; the first failure is returned afterwards and chunks already
    /// written stay written.
    ///
    /// A partially covered chunk is read, merged and stored under a per-chunk
    /// lock held by this handle and its clones only. Concurrent partial writes
    /// to the same chunk through independently opened handles can overwrite
    /// each other.
    pub async fn write(&self, selection: &Selection, data: &ArrayBuffer) -> Result<()> {
        let normalized = selection.normalize(self.shape())?;
        let full_shape = normalized.full_output_shape();
        if data.data_type() != self.data_type() {
            return Err(ArrayError::validation(format!(
                "cannot write {} data to an array of {}",
                data.data_type(),
                self.data_type()
            )));
        }
        if data.shape() != full_shape.as_slice()
            && data.shape() != normalized.output_shape().as_slice()
        {
            return Err(ArrayError::validation(format!(
                "data of shape {:?} does not match selection shape {:?}",
                data.shape(),
                normalized.output_shape()
            )));
        }

        let operations = decompose_normalized(&normalized, self.metadata.chunk_shape());
        let full_shape = &full_shape;
        let results: Vec<Result<()>> = stream::iter(operations)
            .map(|op| self.write_operation(op, data, full_shape))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let total = results.len();
        let mut first_error = None;
        let mut failed = 0usize;
        for result in results {
            if let Err(e) = result {
                failed += 1;
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => {
                log::warn!(
                    "{} of {} chunk writes to {:?} failed",
                    failed,
                    total,
                    self.path
                );
                Err(e)
            }
            None => {
                log::debug!("Wrote {} chunks of {:?}", total, self.path);
                Ok(())
            }
        }
    }

    /// Write an ndarray into the elements of `selection`
    pub async fn write_ndarray<T: Element>(
        &self,
        selection: &Selection,
        data: &ArrayD<T>,
    ) -> Result<()> {
        self.write(selection, &ArrayBuffer::from_ndarray(data)?).await
    }

    async fn replace_metadata(&self, metadata: ArrayMetadata) -> Result<Self> {
        let document = Bytes::from(metadata.to_json()?);
        self.store.set(&metadata_key(&self.path), document).await?;
        let mut array = Self::from_parts(
            self.store.clone(),
            self.path.clone(),
            metadata,
            self.registry.clone(),
            self.config.clone(),
        )?;
        array.locks = self.locks.clone();
        Ok(array)
    }

    /// Persist a new shape and return a handle using it
    ///
    /// Chunks outside the new shape are left in the store.
    pub async fn resize(&self, shape: Vec<u64>) -> Result<Self> {
        let metadata = self.metadata.with_shape(shape)?;
        self.replace_metadata(metadata).await
    }

    /// Persist new user attributes and return a handle using them
    pub async fn set_attributes(
        &self,
        attributes: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self> {
        let metadata = self.metadata.with_attributes(attributes);
        self.replace_metadata(metadata).await
    }

    /// Summary statistics, including the stored size of every chunk
    pub async fn info(&self) -> Result<ArrayInfo> {
        let keys = self.stored_chunk_keys().await?;
        let mut stored_bytes = 0;
        for key in &keys {
            stored_bytes += self.store.size(key).await?.unwrap_or(0);
        }
        Ok(ArrayInfo {
            shape: self.shape().to_vec(),
            chunk_shape: self.metadata.chunk_shape().to_vec(),
            data_type: self.data_type(),
            codecs: self.pipeline.descriptors().into_iter().map(|d| d.name).collect(),
            chunk_count: self.chunk_grid().chunk_count(),
            stored_chunks: keys.len() as u64,
            uncompressed_size: self.uncompressed_size(),
            stored_bytes,
        })
    }

    fn uncompressed_size(&self) -> u64 {
        self.shape().iter().product::<u64>() * self.data_type().size_in_bytes() as u64
    }

    fn info_line(&self) -> String {
        format!(
            "{:?} {} in {:?} chunks, {} uncompressed",
            self.shape(),
            self.data_type(),
            self.metadata.chunk_shape(),
            format_bytes(self.uncompressed_size())
        )
    }
}

/// Array statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayInfo {
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
    pub data_type: DataType,
    pub codecs: Vec<String>,
    pub chunk_count: u64,
    pub stored_chunks: u64,
    pub uncompressed_size: u64,
    pub stored_bytes: u64,
}

impl ArrayInfo {
    pub fn summary(&self) -> String {
        let shape = self
            .shape
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" x ");
        format!(
            "{}D array: {} ({}), {}/{} chunks stored, {} uncompressed, {} stored [{}]",
            self.shape.len(),
            shape,
            self.data_type,
            self.stored_chunks,
            self.chunk_count,
            format_bytes(self.uncompressed_size),
            format_bytes(self.stored_bytes),
            self.codecs.join(", ")
        )
    }
}
