//! Blocking facade over the async API
//!
//! [`SyncArray`] drives an [`Array`] on a dedicated tokio runtime. Its methods
//! must not be called from inside an async context.

use crate::array::{Array, ArrayInfo};
use crate::buffer::ArrayBuffer;
use crate::config::ArrayConfig;
use crate::error::{ArrayError, Result};
use crate::metadata::ArrayMetadata;
use crate::selection::Selection;
use crate::store::Store;
use crate::types::Element;
use ndarray::ArrayD;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

/// A runtime for blocking calls, with an optional per-call timeout
#[derive(Debug)]
pub struct SyncRuntime {
    runtime: Runtime,
    timeout: Option<Duration>,
}

impl SyncRuntime {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("ndstore-sync")
            .enable_all()
            .build()?;
        Ok(Self { runtime, timeout })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `future` to completion, failing with [`ArrayError::Timeout`] if it
    /// takes longer than the configured timeout
    pub fn block_on<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.timeout {
            Some(timeout) => self.runtime.block_on(async {
                tokio::time::timeout(timeout, future)
                    .await
                    .map_err(|_| ArrayError::Timeout(format!("call exceeded {timeout:?}")))?
            }),
            None => self.runtime.block_on(future),
        }
    }
}

/// Blocking handle to an array
#[derive(Debug, Clone)]
pub struct SyncArray {
    array: Array,
    runtime: Arc<SyncRuntime>,
}

impl SyncArray {
    fn runtime_for(config: &ArrayConfig) -> Result<Arc<SyncRuntime>> {
        Ok(Arc::new(SyncRuntime::new(config.sync_timeout)?))
    }

    /// Create a new array, see [`Array::create`]
    pub fn create(
        store: Arc<dyn Store>,
        path: &str,
        metadata: ArrayMetadata,
        config: ArrayConfig,
    ) -> Result<Self> {
        let runtime = Self::runtime_for(&config)?;
        let array = runtime.block_on(Array::create(store, path, metadata, config))?;
        Ok(Self { array, runtime })
    }

    /// Open an existing array, see [`Array::open`]
    pub fn open(store: Arc<dyn Store>, path: &str, config: ArrayConfig) -> Result<Self> {
        let runtime = Self::runtime_for(&config)?;
        let array = runtime.block_on(Array::open(store, path, config))?;
        Ok(Self { array, runtime })
    }

    /// Wrap an async handle, running it on `runtime`
    pub fn from_array(array: Array, runtime: Arc<SyncRuntime>) -> Self {
        Self { array, runtime }
    }

    /// The underlying async handle
    pub fn array(&self) -> &Array {
        &self.array
    }

    pub fn shape(&self) -> &[u64] {
        self.array.shape()
    }

    pub fn metadata(&self) -> &ArrayMetadata {
        self.array.metadata()
    }

    pub fn read(&self, selection: &Selection) -> Result<ArrayBuffer> {
        self.runtime.block_on(self.array.read(selection))
    }

    pub fn read_ndarray<T: Element>(&self, selection: &Selection) -> Result<ArrayD<T>> {
        self.runtime.block_on(self.array.read_ndarray(selection))
    }

    pub fn write(&self, selection: &Selection, data: &ArrayBuffer) -> Result<()> {
        self.runtime.block_on(self.array.write(selection, data))
    }

    pub fn write_ndarray<T: Element>(&self, selection: &Selection, data: &ArrayD<T>) -> Result<()> {
        self.runtime.block_on(self.array.write_ndarray(selection, data))
    }

    pub fn retrieve_chunk(&self, chunk_coords: &[u64]) -> Result<ArrayBuffer> {
        self.runtime.block_on(self.array.retrieve_chunk(chunk_coords))
    }

    pub fn store_chunk(&self, chunk_coords: &[u64], chunk: ArrayBuffer) -> Result<()> {
        self.runtime.block_on(self.array.store_chunk(chunk_coords, chunk))
    }

    pub fn erase_chunk(&self, chunk_coords: &[u64]) -> Result<()> {
        self.runtime.block_on(self.array.erase_chunk(chunk_coords))
    }

    pub fn stored_chunk_keys(&self) -> Result<Vec<String>> {
        self.runtime.block_on(self.array.stored_chunk_keys())
    }

    pub fn info(&self) -> Result<ArrayInfo> {
        self.runtime.block_on(self.array.info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::DataType;
    use ndarray::array;

    #[test]
    fn test_blocking_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let metadata = ArrayMetadata::builder(vec![2, 3], vec![2, 2], DataType::Float64)
            .build()
            .unwrap();
        let array =
            SyncArray::create(store.clone(), "a", metadata, ArrayConfig::default()).unwrap();
        let data = array![[1.0f64, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn();
        array.write_ndarray(&Selection::all(), &data).unwrap();

        let reopened = SyncArray::open(store, "a", ArrayConfig::default()).unwrap();
        assert_eq!(reopened.read_ndarray::<f64>(&Selection::all()).unwrap(), data);
        assert_eq!(reopened.stored_chunk_keys().unwrap(), vec!["a/c/0/0", "a/c/0/1"]);
    }

    #[test]
    fn test_timeout() {
        let runtime = SyncRuntime::new(Some(Duration::from_millis(10))).unwrap();
        let err = runtime
            .block_on(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, ArrayError::Timeout(_)));

        let value = runtime.block_on(async { Ok(7) }).unwrap();
        assert_eq!(value, 7);
    }
}
