//! Key-value stores holding metadata documents and encoded chunks
//!
//! A [`Store`] maps string keys to byte values. Keys are `/`-separated paths
//! relative to the store root. The array layer only ever talks to a store
//! through this trait.

use crate::error::{ArrayError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::{Bound, RangeBounds};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::io::Write;
use tokio::fs;

/// A byte range within a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `length` bytes from `offset`, or to the end if `length` is `None`
    FromStart(u64, Option<u64>),
    /// The last `length` bytes
    Suffix(u64),
}

impl ByteRange {
    /// Create a byte range from standard range bounds
    pub fn new(bounds: impl RangeBounds<u64>) -> Self {
        let start = match bounds.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s + 1,
            Bound::Unbounded => 0,
        };
        let length = match bounds.end_bound() {
            Bound::Included(&e) => Some(e + 1 - start),
            Bound::Excluded(&e) => Some(e.saturating_sub(start)),
            Bound::Unbounded => None,
        };
        ByteRange::FromStart(start, length)
    }

    /// Resolve against a value of `size` bytes
    pub fn to_range(&self, size: u64) -> Result<std::ops::Range<usize>> {
        let (start, end) = match *self {
            ByteRange::FromStart(offset, length) => {
                (offset, length.map_or(size, |l| offset.saturating_add(l)))
            }
            ByteRange::Suffix(length) => (size.saturating_sub(length), size),
        };
        if start > size || end > size {
            return Err(ArrayError::validation(format!(
                "byte range {self:?} is outside a value of {size} bytes"
            )));
        }
        Ok(start as usize..end as usize)
    }
}

/// Asynchronous key-value store
#[async_trait]
pub trait Store: Send + Sync {
    /// Value of `key`, or `None` if absent
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Part of the value of `key`, or `None` if absent
    async fn get_partial(&self, key: &str, range: ByteRange) -> Result<Option<Bytes>> {
        match self.get(key).await? {
            Some(value) => {
                let range = range.to_range(value.len() as u64)?;
                Ok(Some(value.slice(range)))
            }
            None => Ok(None),
        }
    }

    /// Store `value` under `key`, replacing any existing value
    async fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Store `value` only if `key` is absent. Returns true if it was stored.
    async fn set_if_absent(&self, key: &str, value: Bytes) -> Result<bool>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// All keys starting with `prefix`, in lexicographic order
    fn list_prefix<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, Result<String>>;

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Size in bytes of the value of `key`
    async fn size(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.get(key).await?.map(|v| v.len() as u64))
    }

    /// Remove every key starting with `prefix`
    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let keys: Vec<String> = self.list_prefix(prefix).try_collect().await?;
        for key in keys {
            self.delete(&key).await?;
        }
        Ok(())
    }

    /// True if [`Store::get_partial`] avoids reading the whole value
    fn supports_partial_reads(&self) -> bool {
        false
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(ArrayError::validation(format!("invalid store key {key:?}")));
    }
    Ok(())
}

/// A store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        validate_key(key)?;
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Bytes) -> Result<bool> {
        validate_key(key)?;
        let mut data = self.data.write();
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), value);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn list_prefix<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, Result<String>> {
        let keys: Vec<Result<String>> = self
            .data
            .read()
            .range(prefix.to_string()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .map(|k| Ok(k.clone()))
            .collect();
        stream::iter(keys).boxed()
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn supports_partial_reads(&self) -> bool {
        true
    }
}

/// A store backed by a directory of the local file system
///
/// Each key is a file path relative to the base directory. Values are written
/// to a temporary file beside the target and renamed into place, so a reader
/// sees either the old value or the new one.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    base_path: PathBuf,
}

/// Prefix of in-flight temporary files, never listed as keys
const TEMP_PREFIX: &str = ".ndstore-tmp-";

/// Map an I/O failure on `path` to a store error
fn unavailable(op: &str, path: &Path, err: std::io::Error) -> ArrayError {
    ArrayError::store_unavailable(format!("{op} {}: {err}", path.display()))
}

fn is_not_found(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::NotFound
}

impl FilesystemStore {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn full_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    /// Write `value` to `path` through a temporary file. With `overwrite`
    /// unset an existing file is kept and `false` is returned.
    async fn write_atomic(path: PathBuf, value: Bytes, overwrite: bool) -> Result<bool> {
        let target = path.clone();
        let written = tokio::task::spawn_blocking(move || -> std::io::Result<bool> {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)?;
            let mut temp = tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .tempfile_in(dir)?;
            temp.write_all(&value)?;
            temp.as_file().sync_data()?;
            if overwrite {
                temp.persist(&path).map_err(|e| e.error)?;
                return Ok(true);
            }
            match temp.persist_noclobber(&path) {
                Ok(_) => Ok(true),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(e.error),
            }
        })
        .await
        .map_err(|e| ArrayError::store_unavailable(format!("write task failed: {e}")))?;
        written.map_err(|e| unavailable("write", &target, e))
    }

    /// Every file key below `dir`, which is `dir_key` relative to the base
    async fn walk(&self, dir: PathBuf, dir_key: String) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![(dir, dir_key)];
        while let Some((dir, dir_key)) = pending.pop() {
            let mut read_dir = match fs::read_dir(&dir).await {
                Ok(read_dir) => read_dir,
                Err(e) if is_not_found(&e) => continue,
                Err(e) => return Err(unavailable("list", &dir, e)),
            };
            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| unavailable("list", &dir, e))?
            {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if name.starts_with(TEMP_PREFIX) {
                    continue;
                }
                let key = if dir_key.is_empty() {
                    name
                } else {
                    format!("{dir_key}/{name}")
                };
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| unavailable("list", &entry.path(), e))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), key));
                } else {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl Store for FilesystemStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.full_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(unavailable("read", &path, e)),
        }
    }

    async fn get_partial(&self, key: &str, range: ByteRange) -> Result<Option<Bytes>> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let path = self.full_path(key)?;
        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(unavailable("open", &path, e)),
        };
        let size = file
            .metadata()
            .await
            .map_err(|e| unavailable("stat", &path, e))?
            .len();
        let range = range.to_range(size)?;
        let mut buffer = vec![0; range.len()];
        file.seek(std::io::SeekFrom::Start(range.start as u64))
            .await
            .map_err(|e| unavailable("seek", &path, e))?;
        file.read_exact(&mut buffer)
            .await
            .map_err(|e| unavailable("read", &path, e))?;
        Ok(Some(Bytes::from(buffer)))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        Self::write_atomic(self.full_path(key)?, value, true).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Bytes) -> Result<bool> {
        Self::write_atomic(self.full_path(key)?, value, false).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.full_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(unavailable("delete", &path, e)),
        }
    }

    fn list_prefix<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, Result<String>> {
        // Only the directory holding the prefix needs to be walked
        let dir_key = prefix.rfind('/').map_or("", |i| &prefix[..i]).to_string();
        let dir = if dir_key.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(&dir_key)
        };
        stream::once(async move {
            let mut keys = self.walk(dir, dir_key).await?;
            keys.retain(|k| k.starts_with(prefix));
            keys.sort();
            Ok::<_, ArrayError>(stream::iter(keys.into_iter().map(Ok)))
        })
        .try_flatten()
        .boxed()
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.full_path(key)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| unavailable("stat", &path, e))
    }

    async fn size(&self, key: &str) -> Result<Option<u64>> {
        let path = self.full_path(key)?;
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(unavailable("stat", &path, e)),
        }
    }

    fn supports_partial_reads(&self) -> bool {
        true
    }
}

/// Kinds of store that can be opened from a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScheme {
    Memory,
    Filesystem,
}

impl StoreScheme {
    /// Parse the store kind from a URL scheme. A bare path is a filesystem store.
    pub fn from_url(url: &str) -> Result<Self> {
        match url.find("://") {
            Some(scheme_end) => match &url[..scheme_end] {
                "memory" => Ok(StoreScheme::Memory),
                "file" => Ok(StoreScheme::Filesystem),
                scheme => Err(ArrayError::Configuration(format!(
                    "unsupported store scheme: {scheme}"
                ))),
            },
            None => Ok(StoreScheme::Filesystem),
        }
    }
}

/// Open a store from a URL: `memory://`, `file:///path` or a bare path
///
/// Other transports are supported by implementing [`Store`] directly.
pub fn open_store(url: &str) -> Result<Arc<dyn Store>> {
    match StoreScheme::from_url(url)? {
        StoreScheme::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreScheme::Filesystem => {
            let path = url.strip_prefix("file://").unwrap_or(url);
            if path.is_empty() {
                return Err(ArrayError::Configuration("empty filesystem path".into()));
            }
            Ok(Arc::new(FilesystemStore::new(path)))
        }
    }
}
