//! 🎬 *[a queue fills with lines. five workers wait at a barrier.]*
//! *[the last one arrives. the barrier lifts. nobody says a word.]*
//!
//! 🗑️ The LineWorker: `WAITING_AT_BARRIER → RUNNING → DRAINED`.
//!
//! Per line: bytes → UTF-8 → blank? → decode → route by device type → insert.
//! Every line ends up counted as processed, counted as an error, or (if blank) not counted at
//! all. Every line gets marked done, because the `WorkItem` marks itself done on drop.
//! Nothing a single line does can stop the loop.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Barrier;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Worker, WorkerContext};
use crate::decoder::parse_appsinstalled;
use crate::inserter::insert_appsinstalled;
use crate::stats::{LoadCounters, RunStats};
use crate::supervisors::work_queue::WorkQueue;

/// 🏷️ What became of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineOutcome {
    Blank,
    Processed,
    Error,
}

#[derive(Debug)]
pub(crate) struct LineWorker {
    name: String,
    queue: Arc<WorkQueue>,
    barrier: Arc<Barrier>,
    stats: Arc<RunStats>,
    context: Arc<WorkerContext>,
}

impl LineWorker {
    pub(crate) fn new(
        name: String,
        queue: Arc<WorkQueue>,
        barrier: Arc<Barrier>,
        stats: Arc<RunStats>,
        context: Arc<WorkerContext>,
    ) -> Self {
        Self {
            name,
            queue,
            barrier,
            stats,
            context,
        }
    }

    async fn handle_line(&self, raw: &[u8]) -> LineOutcome {
        let Ok(line) = std::str::from_utf8(raw) else {
            warn!(worker = %self.name, "⚠️ Line is not valid UTF-8, skipping {} bytes", raw.len());
            return LineOutcome::Error;
        };
        if line.trim().is_empty() {
            return LineOutcome::Blank;
        }

        let Some(record) = parse_appsinstalled(line) else {
            debug!(worker = %self.name, "🐛 Could not decode line: `{}`", line.trim());
            return LineOutcome::Error;
        };

        let Some(address) = self.context.destinations.get(&record.dev_type) else {
            error!(worker = %self.name, "💀 Unknown device type: {}", record.dev_type);
            return LineOutcome::Error;
        };

        if insert_appsinstalled(&self.context.connections, address, &record, self.context.dry_run).await {
            LineOutcome::Processed
        } else {
            LineOutcome::Error
        }
    }
}

impl Worker for LineWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            self.barrier.wait().await;
            info!(worker = %self.name, "🚀 Start {}", self.name);

            let mut counters = LoadCounters::default();
            while let Some(item) = self.queue.take().await {
                match self.handle_line(item.line()).await {
                    LineOutcome::Blank => {}
                    LineOutcome::Processed => counters.processed += 1,
                    LineOutcome::Error => counters.errors += 1,
                }
                // -- ✅ `item` drops here, and with it the queue's outstanding count
            }

            // -- 🔇 per-worker verdicts are chatter; the file-level one is logged by the supervisor
            let verdict = if counters.is_acceptable(self.context.normal_error_rate) {
                "Successful load"
            } else {
                "Failed load"
            };
            debug!(
                worker = %self.name,
                processed = counters.processed,
                errors = counters.errors,
                "🏁 {} drained, error rate {:.4}. {}",
                self.name,
                counters.error_rate(),
                verdict
            );
            self.stats.absorb(counters);
            Ok(())
        })
    }
}
