//! 🦆 memc-load: gzip'd TSV in, protobuf'd memcached out.
//!
//! Files are loaded one at a time, in glob order; each one gets its own worker pool.
//! The connections outlive the files. The binary lives next door in `memc-load-cli`.

pub mod app_config;
mod backends;
mod common;
mod decoder;
mod inserter;
mod progress;
pub mod self_test;
mod stats;
mod supervisors;

use anyhow::{Context, Result};

use crate::app_config::AppConfig;
use crate::supervisors::Supervisor;

pub use progress::{FileReport, RunReport};
pub use stats::LoadCounters;

/// 🚀 Load every file matching `app_config.pattern`. Per-line trouble ends up in the report;
/// only orchestration failures come back as `Err`.
pub async fn run(app_config: AppConfig) -> Result<RunReport> {
    app_config.validate().context("💀 The configuration made it this far, but it is not usable")?;
    Supervisor::new(app_config)
        .run()
        .await
        .context("💀 The load stopped before every file was done")
}
