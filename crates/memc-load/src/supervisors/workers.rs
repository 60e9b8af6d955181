//! 🧵 Workers: the backbone of memc-load, the unsung heroes, the ones who actually
//! do the work while the Supervisor takes all the credit in the sprint retro.
//!
//! ⚠️ "If you're reading this, the code review went poorly."

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;

mod line_worker;
pub(crate) use line_worker::LineWorker;

use crate::backends::ConnectionCache;

/// 🏗️ A background worker, that does work. duh.
pub(crate) trait Worker {
    /// 🚀 Start the worker. Returns a JoinHandle because we trust but verify. Mostly verify.
    fn start(self) -> JoinHandle<Result<()>>;
}

/// 📦 Everything a worker needs that does not change between files.
#[derive(Debug)]
pub(crate) struct WorkerContext {
    pub destinations: BTreeMap<String, String>,
    pub connections: Arc<ConnectionCache>,
    pub dry_run: bool,
    pub normal_error_rate: f64,
}
