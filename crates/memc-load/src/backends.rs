//! 🔌 Backends, where the real I/O happens.
//!
//! 🚰 Records flow in from the workers and get slurped up by a cache. Which cache?
//! Depends on the config. Memcached for the real thing, an in-memory stash for tests
//! and for people who just want to watch the pipeline run without a server on the other end.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait (`Sink`) → concrete impls (`MemcacheSink`, `InMemorySink`) → `SinkBackend` enum
//! - `ConnectionCache` owns one `SinkBackend` per destination address, for the whole run
//! - Retries live in the `ConnectionCache`, not in the sinks. Sinks do one attempt and report.
//!
//! 🦆 The duck is here because every file must have one. Do not question the duck.

use anyhow::Result;
use async_trait::async_trait;

pub(crate) mod connection_cache;
pub(crate) mod in_mem;
pub(crate) mod memcache;

pub(crate) use connection_cache::{ConnectionCache, RetryPolicy};
pub(crate) use in_mem::{InMemorySink, InMemoryStore};
pub(crate) use memcache::MemcacheSink;

/// 🕳️ A key/value sink. One `set`, one attempt, one honest answer.
///
/// # Contract 📜
/// - `set` stores opaque bytes under a UTF-8 key. No get. No delete. We are a loader, not a cache client library.
/// - `set` takes `&self` because the handle is shared by every worker writing to the same address.
///   Implementations serialize access internally.
/// - `close` releases whatever the sink is holding. Calling `set` afterwards may reconnect.
#[async_trait]
pub(crate) trait Sink: std::fmt::Debug + Send + Sync {
    /// 📡 Store `value` under `key`. Exactly one attempt.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    /// 🗑️ Let go of the connection. Or the vibes. Whatever the sink was holding.
    async fn close(&self) -> Result<()>;
}

/// 🎭 The many faces of a Sink, dispatched by enum so the workers never need to know
/// whether their bytes land in a socket or a `Vec`.
#[derive(Debug)]
pub(crate) enum SinkBackend {
    Memcache(MemcacheSink),
    InMemory(InMemorySink),
}

#[async_trait]
impl Sink for SinkBackend {
    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        match self {
            SinkBackend::Memcache(sink) => sink.set(key, value).await,
            SinkBackend::InMemory(sink) => sink.set(key, value).await,
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            SinkBackend::Memcache(sink) => sink.close().await,
            SinkBackend::InMemory(sink) => sink.close().await,
        }
    }
}
