//! # Previously, on memc-load...
//!
//! 🎬 The records were ready. The memcached servers were not. Somebody had to catch
//! the bytes anyway, so that the pipeline could be tested, demoed, and dry-run with
//! real accounting. That somebody lives entirely in RAM and is gone the moment you blink.
//!
//! [`InMemoryStore`] is shared by every [`InMemorySink`] of one run, so a test can ask
//! "what landed where?" after the fact. It can also be told to fail the next N writes,
//! which is how the retry loop gets its exercise.
//!
//! ⚠️ This is NOT for production. If you're loading prod data into this, please also deploy a therapist.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::Sink;

/// 📦 One write that made it. Address, key, bytes. The evidence locker.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredWrite {
    pub address: String,
    pub key: String,
    pub value: Vec<u8>,
}

/// 🔒 The vault behind every in-memory sink. Cloning shares it. Communist data, but in a good way.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryStore {
    writes: Arc<Mutex<Vec<StoredWrite>>>,
    // -- 💀 how many upcoming `set` calls should fail, across all addresses
    failures_remaining: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// 🧪 Make the next `count` writes fail. Chaos, on a budget.
    #[cfg(test)]
    pub(crate) fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// 📜 Everything stored so far, in arrival order.
    #[cfg(test)]
    pub(crate) async fn writes(&self) -> Vec<StoredWrite> {
        self.writes.lock().await.clone()
    }

    /// 🔢 How many writes the vault is holding.
    pub(crate) async fn len(&self) -> usize {
        self.writes.lock().await.len()
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// 📦 A sink for one address, writing into the shared [`InMemoryStore`].
#[derive(Debug, Clone)]
pub(crate) struct InMemorySink {
    address: String,
    store: InMemoryStore,
}

impl InMemorySink {
    pub(crate) fn new(address: &str, store: InMemoryStore) -> Self {
        Self {
            address: address.to_string(),
            store,
        }
    }
}

#[async_trait]
impl Sink for InMemorySink {
    /// 📡 Lock, push, done. Unless the store was told to fail, in which case: fail.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        if self.store.take_failure() {
            bail!("💀 in-memory sink for '{}' was told to fail, and it is nothing if not obedient", self.address);
        }
        self.store.writes.lock().await.push(StoredWrite {
            address: self.address.clone(),
            key: key.to_string(),
            value: value.to_vec(),
        });
        Ok(())
    }

    /// 🗑️ Nothing to close. We hold bytes and vibes, and the vibes are ref-counted.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
