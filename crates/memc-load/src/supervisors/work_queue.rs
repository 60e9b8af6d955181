//! 📬 WorkQueue: the single hand-off point between the file reader and the worker pool.
//!
//! 🧠 Knowledge graph:
//! - FIFO of raw line bytes over an `async_channel`. Unbounded by default, bounded on request.
//! - `outstanding` counts items pushed but not yet marked done. It goes up BEFORE the send and
//!   comes down when a [`WorkItem`] is dropped, so it can only reach zero once every item that
//!   ever entered the queue has been taken AND finished.
//! - Drained = closed by the producer + `outstanding == 0`. `wait_drained` blocks on exactly that.
//! - Workers exit on "closed and empty", never on a racy `is_empty()` peek.
//!
//! One queue per file. It is born in `ingest_file`, and it dies there.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender};
use tokio::sync::Notify;

/// 📬 One per file. Shared by `Arc` between the loader and the workers.
#[derive(Debug)]
pub(crate) struct WorkQueue {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    outstanding: AtomicUsize,
    drained: Notify,
}

impl WorkQueue {
    /// 🏗️ `None` = unbounded. `Some(n)` = the loader blocks once `n` lines are waiting.
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        let (tx, rx) = match capacity {
            Some(capacity) => async_channel::bounded(capacity),
            None => async_channel::unbounded(),
        };
        Self {
            tx,
            rx,
            outstanding: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// 📥 Enqueue from async land.
    #[cfg(test)]
    pub(crate) async fn push(&self, line: Vec<u8>) -> Result<()> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(line).await.is_err() {
            self.task_done();
            return Err(anyhow!("💀 the work queue is closed, nobody is taking lines anymore"));
        }
        Ok(())
    }

    /// 📥 Enqueue from a blocking thread (the gzip reader lives on one).
    pub(crate) fn push_blocking(&self, line: Vec<u8>) -> Result<()> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if self.tx.send_blocking(line).is_err() {
            self.task_done();
            return Err(anyhow!("💀 the work queue is closed, nobody is taking lines anymore"));
        }
        Ok(())
    }

    /// 🚪 No more lines are coming. Workers finish what is left, then go home.
    pub(crate) fn close(&self) {
        self.tx.close();
        // -- 🔔 if everything was already done, whoever waits on the drain can stop waiting now
        self.drained.notify_waiters();
    }

    /// 📤 Take the next item. `None` once the queue is closed AND empty.
    pub(crate) async fn take(&self) -> Option<WorkItem<'_>> {
        let line = self.rx.recv().await.ok()?;
        Some(WorkItem { line, queue: self })
    }

    /// 🔢 Items pushed but not yet finished.
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// ⏳ Block until the queue is closed and every item has been marked done.
    pub(crate) async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // -- 🔒 register interest BEFORE checking, or a wake-up could slip through the gap
            notified.as_mut().enable();
            if self.tx.is_closed() && self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn task_done(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// 🎫 A line on loan from the queue. Dropping it marks it done, however the handling went.
#[derive(Debug)]
pub(crate) struct WorkItem<'a> {
    line: Vec<u8>,
    queue: &'a WorkQueue,
}

impl WorkItem<'_> {
    pub(crate) fn line(&self) -> &[u8] {
        &self.line
    }
}

impl Drop for WorkItem<'_> {
    fn drop(&mut self) {
        self.queue.task_done();
    }
}
