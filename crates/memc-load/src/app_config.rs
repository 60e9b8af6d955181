//! 🔧 App Configuration, the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." -- every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment. Layers, lowest priority first:
//!   1. built-in defaults (serde defaults, plus the four classic destination addresses)
//!   2. `MEMC_LOAD_*` environment variables, nested keys split on `__`
//!   3. the TOML file, if one was given. TOML wins over env on conflicts.
//!   4. command-line overrides, which win over everything

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::info;

pub use crate::backends::memcache::MemcacheSinkConfig;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    /// 🌍 Which files to ingest.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// 🧪 Log what would be written, write nothing.
    #[serde(default, alias = "dry")]
    pub dry_run: bool,
    /// 🗺️ device type → cache address. Anything not in here is an "unknown device type".
    #[serde(default = "default_destinations")]
    pub destinations: BTreeMap<String, String>,
    /// 🕳️ Where the bytes go.
    #[serde(default)]
    pub sink: SinkConfig,
    /// 🧵 How hard the pool works, and how often it tries again.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            dry_run: false,
            destinations: default_destinations(),
            sink: SinkConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl AppConfig {
    /// 🔒 Catch the configs that parse fine but cannot possibly work.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runtime.workers == 0 {
            bail!("💀 runtime.workers is 0. A pool with no workers drains nothing, forever.");
        }
        if self.runtime.queue_capacity == Some(0) {
            bail!("💀 runtime.queue_capacity is 0. Leave it out for an unbounded queue.");
        }
        if !(self.runtime.normal_error_rate.is_finite() && self.runtime.normal_error_rate >= 0.0) {
            bail!(
                "💀 runtime.normal_error_rate must be a non-negative number, got {}",
                self.runtime.normal_error_rate
            );
        }
        if self.pattern.trim().is_empty() {
            bail!("💀 pattern is empty. We need at least a hint of which files to eat.");
        }
        Ok(())
    }
}

/// 🎭 The sink family. Externally tagged, so TOML reads `[sink.Memcache]` or `sink = "InMemory"`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub enum SinkConfig {
    Memcache(MemcacheSinkConfig),
    InMemory,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Memcache(MemcacheSinkConfig::default())
    }
}

/// 🧵 Runtime knobs: pool size, retry budget, queue bound, and the error-rate bar.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default = "default_workers", alias = "threads")]
    pub workers: usize,
    /// ➕ extra attempts after a failed write
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// 📏 absent = unbounded
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    #[serde(default = "default_normal_error_rate")]
    pub normal_error_rate: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            queue_capacity: None,
            normal_error_rate: default_normal_error_rate(),
        }
    }
}

fn default_pattern() -> String {
    "*.tsv.gz".to_string()
}

// -- 🗺️ the four horsemen of device identity, each with its own memcached
fn default_destinations() -> BTreeMap<String, String> {
    [
        ("idfa", "127.0.0.1:33013"),
        ("gaid", "127.0.0.1:33014"),
        ("adid", "127.0.0.1:33015"),
        ("dvid", "127.0.0.1:33016"),
    ]
    .into_iter()
    .map(|(dev_type, address)| (dev_type.to_string(), address.to_string()))
    .collect()
}

fn default_workers() -> usize {
    5
}

fn default_retry_attempts() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    1000
}

// -- 📊 one percent. anything above and the load is declared a failure.
fn default_normal_error_rate() -> f64 {
    0.01
}

/// 🎛️ What the command line gets to say. `None` / empty = "no opinion, ask the lower layers".
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub pattern: Option<String>,
    pub dry_run: bool,
    pub destinations: BTreeMap<String, String>,
    pub workers: Option<usize>,
}

/// 🚀 Load the config: defaults, then env, then the optional TOML file, then CLI overrides.
///
/// 💀 Returns an error if the config is unparseable or fails [`AppConfig::validate`].
pub fn load_config(config_file_name: Option<&Path>, overrides: &ConfigOverrides) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    // -- 🗺️ destinations get seeded as a dictionary so a file that names one device type
    // -- extends the classic four instead of replacing them
    let config = Figment::new()
        .merge(Serialized::default("destinations", default_destinations()))
        .merge(Env::prefixed("MEMC_LOAD_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let mut config = config;
    if let Some(pattern) = &overrides.pattern {
        config = config.merge(Serialized::default("pattern", pattern));
    }
    if overrides.dry_run {
        config = config.merge(Serialized::default("dry_run", true));
    }
    for (dev_type, address) in &overrides.destinations {
        config = config.merge(Serialized::default(&format!("destinations.{dev_type}"), address));
    }
    if let Some(workers) = overrides.workers {
        config = config.merge(Serialized::default("runtime.workers", workers));
    }

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (MEMC_LOAD_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (MEMC_LOAD_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config.validate()?;
    Ok(app_config)
}
