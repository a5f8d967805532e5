//! A store wrapper that logs every call

use crate::error::Result;
use crate::store::{ByteRange, Store};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Instant;

/// Wraps a store, logging each call with its duration and counting calls per
/// method.
///
/// Calls are logged at `info` unless another level is set with
/// [`LoggingStore::with_level`].
///
/// Log lines look like:
/// ```text
/// Calling MemoryStore.get(array/c/0/1)
/// Finished MemoryStore.get(array/c/0/1) [0.00s]
/// ```
#[derive(Debug)]
pub struct LoggingStore<S> {
    inner: S,
    name: &'static str,
    level: log::Level,
    counter: Mutex<BTreeMap<&'static str, u64>>,
}

struct CallLog {
    op: String,
    level: log::Level,
    start: Instant,
}

impl CallLog {
    fn new(op: String, level: log::Level) -> Self {
        log::log!(level, "Calling {op}");
        Self {
            op,
            level,
            start: Instant::now(),
        }
    }
}

impl Drop for CallLog {
    fn drop(&mut self) {
        log::log!(
            self.level,
            "Finished {} [{:.2}s]",
            self.op,
            self.start.elapsed().as_secs_f64()
        );
    }
}

impl<S: Store> LoggingStore<S> {
    pub fn new(inner: S) -> Self {
        let type_name = std::any::type_name::<S>();
        let name = type_name.rsplit("::").next().unwrap_or(type_name);
        Self {
            inner,
            name,
            level: log::Level::Info,
            counter: Mutex::new(BTreeMap::new()),
        }
    }

    /// Log calls at `level` instead of `info`
    pub fn with_level(mut self, level: log::Level) -> Self {
        self.level = level;
        self
    }

    pub fn level(&self) -> log::Level {
        self.level
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of calls made to `method` so far
    pub fn count(&self, method: &str) -> u64 {
        self.counter.lock().get(method).copied().unwrap_or(0)
    }

    /// Call counts of every method called so far
    pub fn counts(&self) -> BTreeMap<&'static str, u64> {
        self.counter.lock().clone()
    }

    pub fn reset_counts(&self) {
        self.counter.lock().clear();
    }

    fn log(&self, method: &'static str, hint: &str) -> CallLog {
        *self.counter.lock().entry(method).or_insert(0) += 1;
        let op = if hint.is_empty() {
            format!("{}.{}", self.name, method)
        } else {
            format!("{}.{}({})", self.name, method, hint)
        };
        CallLog::new(op, self.level)
    }
}

#[async_trait]
impl<S: Store> Store for LoggingStore<S> {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let _log = self.log("get", key);
        self.inner.get(key).await
    }

    async fn get_partial(&self, key: &str, range: ByteRange) -> Result<Option<Bytes>> {
        let _log = self.log("get_partial", key);
        self.inner.get_partial(key, range).await
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        let _log = self.log("set", key);
        self.inner.set(key, value).await
    }

    async fn set_if_absent(&self, key: &str, value: Bytes) -> Result<bool> {
        let _log = self.log("set_if_absent", key);
        self.inner.set_if_absent(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _log = self.log("delete", key);
        self.inner.delete(key).await
    }

    fn list_prefix<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, Result<String>> {
        let log = self.log("list_prefix", prefix);
        // finished when the listing stream is dropped
        self.inner
            .list_prefix(prefix)
            .map(move |key| {
                let _log = &log;
                key
            })
            .boxed()
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let _log = self.log("exists", key);
        self.inner.exists(key).await
    }

    async fn size(&self, key: &str) -> Result<Option<u64>> {
        let _log = self.log("size", key);
        self.inner.size(key).await
    }

    fn supports_partial_reads(&self) -> bool {
        self.inner.supports_partial_reads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_counts_calls() {
        let store = LoggingStore::new(MemoryStore::new());
        store.set("a", Bytes::from_static(b"1")).await.unwrap();
        store.set("b", Bytes::from_static(b"2")).await.unwrap();
        store.get("a").await.unwrap();
        assert!(!store.set_if_absent("a", Bytes::new()).await.unwrap());
        let keys: Vec<String> = store.list_prefix("").try_collect().await.unwrap();
        assert_eq!(keys, vec!["a", "b"]);

        assert_eq!(store.count("set"), 2);
        assert_eq!(store.count("get"), 1);
        assert_eq!(store.count("set_if_absent"), 1);
        assert_eq!(store.count("list_prefix"), 1);
        assert_eq!(store.count("delete"), 0);
        assert_eq!(store.inner().len(), 2);

        store.reset_counts();
        assert!(store.counts().is_empty());
    }

    #[test]
    fn test_name() {
        let store = LoggingStore::new(MemoryStore::new());
        assert_eq!(store.name, "MemoryStore");
        assert_eq!(store.level(), log::Level::Info);
    }

    struct RecordingLogger(parking_lot::Mutex<Vec<(log::Level, String)>>);

    impl log::Log for RecordingLogger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            self.0.lock().push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    static LOGGER: RecordingLogger = RecordingLogger(parking_lot::const_mutex(Vec::new()));

    #[tokio::test]
    async fn test_logs_at_configured_level() {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);

        let store = LoggingStore::new(MemoryStore::new()).with_level(log::Level::Debug);
        assert_eq!(store.level(), log::Level::Debug);
        store.set("debug-level/k", Bytes::from_static(b"1")).await.unwrap();
        store.get("debug-level/k").await.unwrap();

        let records: Vec<_> = LOGGER
            .0
            .lock()
            .iter()
            .filter(|(_, message)| message.contains("debug-level/k"))
            .cloned()
            .collect();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|(level, _)| *level == log::Level::Debug));
        assert!(records[0].1.starts_with("Calling MemoryStore.set"));
    }
}
