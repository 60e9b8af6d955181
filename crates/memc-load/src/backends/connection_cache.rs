//! 🔗 ConnectionCache: one sink per destination address, for the whole run.
//!
//! 🎬 *[five workers reach for the same memcached address at the same instant]*
//! *[only one of them gets to dial]*
//! *[the other four get a reference-counted pointer to the result and are grateful]*
//!
//! 🧠 Knowledge graph:
//! - `get_or_create(address)`: lookup + maybe-insert under ONE async mutex. No two handles
//!   for one address, ever, regardless of how many workers pile in at once.
//! - Creating a handle does no I/O (memcached dials on first `set`), so holding the lock
//!   across creation costs nothing but a `HashMap` insert.
//! - `write(address, key, value)`: one attempt plus `RetryPolicy::attempts` more, with a fixed
//!   `RetryPolicy::delay` between them. The last error is the one reported.
//! - The cache outlives files. Workers come and go per file; the sockets stay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::app_config::{RuntimeConfig, SinkConfig};
use crate::backends::{InMemorySink, InMemoryStore, MemcacheSink, Sink, SinkBackend};

/// 🔄 Fixed-delay retry budget. Not exponential. Not jittered. Just patient, once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RetryPolicy {
    /// ➕ Additional attempts after the first failure.
    pub attempts: u32,
    /// ⏱️ Sleep between attempts. Blocks only the worker that is retrying.
    pub delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn from_runtime(runtime: &RuntimeConfig) -> Self {
        Self {
            attempts: runtime.retry_attempts,
            delay: Duration::from_millis(runtime.retry_delay_ms),
        }
    }
}

/// 📦 address → shared sink, plus the knowledge of how to build a new one.
#[derive(Debug)]
pub(crate) struct ConnectionCache {
    sink_config: SinkConfig,
    retry: RetryPolicy,
    // -- 🏦 only used when sink_config is InMemory, but cheap enough to always carry
    store: InMemoryStore,
    handles: Mutex<HashMap<String, Arc<SinkBackend>>>,
}

impl ConnectionCache {
    pub(crate) fn new(sink_config: SinkConfig, retry: RetryPolicy) -> Self {
        Self {
            sink_config,
            retry,
            store: InMemoryStore::default(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// 🏦 The shared vault behind in-memory sinks. Empty forever when talking to memcached.
    #[cfg(test)]
    pub(crate) fn in_memory_store(&self) -> &InMemoryStore {
        &self.store
    }

    /// 🎯 Hand out THE sink for `address`, creating it if this is the first time anyone asked.
    pub(crate) async fn get_or_create(&self, address: &str) -> Arc<SinkBackend> {
        let mut handles = self.handles.lock().await;
        if let Some(sink) = handles.get(address) {
            return Arc::clone(sink);
        }
        debug!(address, "🆕 first write to this address, creating its sink");
        let sink = Arc::new(match &self.sink_config {
            SinkConfig::Memcache(config) => SinkBackend::Memcache(MemcacheSink::new(address, config)),
            SinkConfig::InMemory => SinkBackend::InMemory(InMemorySink::new(address, self.store.clone())),
        });
        handles.insert(address.to_string(), Arc::clone(&sink));
        sink
    }

    /// 📡 Write with the retry budget. `Err` only once the budget is spent.
    pub(crate) async fn write(&self, address: &str, key: &str, value: &[u8]) -> Result<()> {
        let sink = self.get_or_create(address).await;
        let mut attempt = 0;
        loop {
            match sink.set(key, value).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.retry.attempts => {
                    attempt += 1;
                    warn!(
                        address,
                        key,
                        attempt,
                        max_attempts = self.retry.attempts,
                        error = %err,
                        "🔄 write failed, retrying after {:?}",
                        self.retry.delay
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!(
                            "💀 Gave up writing '{}' to '{}' after {} attempt(s)",
                            key,
                            address,
                            attempt + 1
                        )
                    });
                }
            }
        }
    }

    /// 🔢 How many distinct addresses have a sink. Never more than one sink per address.
    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    /// 🗑️ Close every sink. Failures are logged and skipped; the run is already over.
    pub(crate) async fn close_all(&self) {
        let handles: Vec<(String, Arc<SinkBackend>)> = self.handles.lock().await.drain().collect();
        for (address, sink) in handles {
            if let Err(err) = sink.close().await {
                warn!(address = %address, "⚠️ sink did not close cleanly: {:#}", err);
            }
        }
        if matches!(self.sink_config, SinkConfig::InMemory) {
            debug!("🏦 in-memory sinks are holding {} write(s)", self.store.len().await);
        }
    }
}
