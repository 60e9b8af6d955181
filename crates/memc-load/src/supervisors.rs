//! 🎬 *[camera pans across a directory full of .tsv.gz files]*
//! 🎬 "In a world where logs pile up nightly..."
//! 🎬 "One supervisor dared to load them all." 🦆
//!
//! 📦 The Supervisor is the File Ingestion Orchestrator. For each file matching the pattern,
//! in discovery order:
//!   1. build a fresh queue, barrier, tally, and worker pool (all owned by this one file)
//!   2. stream the decompressed lines into the queue, then close it
//!   3. dot-rename the file: it is now "ingested", which is not the same as "written"
//!   4. wait for the queue to drain, join the pool, record the file's counters
//!
//! The `ConnectionCache` is the only thing that survives from one file to the next.
//!
//! ⚠️ WORKERS ARE THE SUPERVISOR'S PRIVATE LITTLE MINIONS. DO NOT MAKE THEM PUB.

mod work_queue;
mod workers;

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use flate2::read::MultiGzDecoder;
use tokio::sync::Barrier;
use tracing::{info, warn};

use crate::app_config::AppConfig;
use crate::backends::{ConnectionCache, RetryPolicy};
use crate::progress::{FileReport, LoadProgress, RunReport};
use crate::stats::{LoadCounters, RunStats};
use work_queue::WorkQueue;
use workers::{LineWorker, Worker, WorkerContext};

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?" every 5 milliseconds.
#[derive(Debug)]
pub(crate) struct Supervisor {
    app_config: AppConfig,
    context: Arc<WorkerContext>,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        let connections = Arc::new(ConnectionCache::new(
            app_config.sink.clone(),
            RetryPolicy::from_runtime(&app_config.runtime),
        ));
        let context = Arc::new(WorkerContext {
            destinations: app_config.destinations.clone(),
            connections,
            dry_run: app_config.dry_run,
            normal_error_rate: app_config.runtime.normal_error_rate,
        });
        Self { app_config, context }
    }

    #[cfg(test)]
    pub(crate) fn connections(&self) -> &ConnectionCache {
        &self.context.connections
    }

    /// 🚀 Load every matching file, one after another. `Err` only for orchestration failures.
    pub(crate) async fn run(&self) -> Result<RunReport> {
        let normal_error_rate = self.app_config.runtime.normal_error_rate;
        let mut report = RunReport::new(normal_error_rate);

        let files = discover_input_files(&self.app_config.pattern)?;
        if files.is_empty() {
            warn!("🤷 No files match '{}'. Nothing to load.", self.app_config.pattern);
        }

        let outcome = async {
            for path in files {
                info!(file = %path.display(), "📂 Processing {}", path.display());
                let counters = self.ingest_file(&path).await?;
                counters.log_verdict(&format!("File {}", path.display()), normal_error_rate);
                report.files.push(FileReport { path, counters });
            }
            Ok::<(), anyhow::Error>(())
        }
        .await;

        // -- 🗑️ sockets get closed whether the run made it or not
        self.context.connections.close_all().await;
        outcome?;

        report.total().log_verdict("Run", normal_error_rate);
        Ok(report)
    }

    /// 🏭 One file, start to drain. Queue, barrier, and pool live and die in here.
    pub(crate) async fn ingest_file(&self, path: &Path) -> Result<LoadCounters> {
        let runtime = &self.app_config.runtime;
        let queue = Arc::new(WorkQueue::new(runtime.queue_capacity));
        let barrier = Arc::new(Barrier::new(runtime.workers));
        let stats = Arc::new(RunStats::default());

        let pool: Vec<_> = (0..runtime.workers)
            .map(|i| {
                LineWorker::new(
                    format!("thr{i}"),
                    Arc::clone(&queue),
                    Arc::clone(&barrier),
                    Arc::clone(&stats),
                    Arc::clone(&self.context),
                )
                .start()
            })
            .collect();

        let loaded = load_queue(path, Arc::clone(&queue)).await;
        // -- 🚪 close no matter what, or the workers would wait for lines that never come
        queue.close();

        let renamed = match &loaded {
            Ok(lines) => {
                info!(file = %path.display(), "📬 Enqueued {} lines", lines);
                dot_rename(path).await
            }
            Err(_) => Ok(()),
        };

        queue.wait_drained().await;
        for joined in futures::future::join_all(pool).await {
            joined.context("💀 A worker panicked. The queue drained, but not gracefully.")??;
        }

        loaded?;
        renamed?;
        Ok(stats.snapshot())
    }
}

/// 🌍 Expand the glob. Files only; anything already dot-renamed is someone else's past.
pub(crate) fn discover_input_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let paths = glob::glob(pattern).with_context(|| format!("💀 '{}' is not a glob pattern we can work with", pattern))?;
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() && !is_hidden(&path) => files.push(path),
            Ok(_) => {}
            Err(err) => warn!("⚠️ Skipping unreadable path while expanding '{}': {}", pattern, err),
        }
    }
    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// 📖 Decompress `path` and push every line into `queue`. Runs on a blocking thread,
/// one line in memory at a time (plus whatever the queue is holding).
async fn load_queue(path: &Path, queue: Arc<WorkQueue>) -> Result<u64> {
    let path = path.to_path_buf();
    let progress = LoadProgress::new(&path);
    let reader_progress = progress.clone();

    let loaded = tokio::task::spawn_blocking(move || -> Result<u64> {
        let file = std::fs::File::open(&path)
            .with_context(|| format!("💀 The door to '{}' would not budge. Missing? Permissions?", path.display()))?;
        let mut reader = BufReader::new(MultiGzDecoder::new(BufReader::new(file)));
        let mut lines = 0u64;
        loop {
            let mut line = Vec::new();
            let bytes_read = reader
                .read_until(b'\n', &mut line)
                .with_context(|| format!("💀 '{}' stopped making sense mid-decompression. Is it really gzip?", path.display()))?;
            if bytes_read == 0 {
                break;
            }
            queue.push_blocking(line)?;
            lines += 1;
            reader_progress.line_enqueued();
        }
        Ok(lines)
    })
    .await
    .map_err(|err| anyhow!("💀 The file reader thread died before finishing: {}", err));

    progress.finish();
    loaded?
}

/// 🏷️ `dir/name` → `dir/.name`. Already gone? Then there is nothing to rename, and that is fine.
pub(crate) async fn dot_rename(path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("💀 '{}' has no file name to hide", path.display()))?;
    let mut hidden_name = std::ffi::OsString::from(".");
    hidden_name.push(file_name);
    let hidden_path = path.with_file_name(hidden_name);

    match tokio::fs::rename(path, &hidden_path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| {
            format!(
                "💀 Could not rename '{}' to '{}'",
                path.display(),
                hidden_path.display()
            )
        }),
    }
}
