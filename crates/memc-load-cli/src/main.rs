//! 🚀 memc-load-cli: the front door, the bouncer, the maitre d' of memc-load.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Parses flags, sets up logging, loads config, and hands the real work to the
//! library. Like a manager. 🦆

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use memc_load::app_config::{ConfigOverrides, load_config};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🔧 The config file we go looking for when nobody says `--config`.
const DEFAULT_CONFIG_FILE: &str = "memc-load.toml";

/// 📬 Load gzip'd app-install logs into memcached, one protobuf at a time.
#[derive(Debug, Parser)]
#[command(name = "memc-load", version, about)]
struct Cli {
    /// Run the protobuf round-trip self-test and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Append logs to this file instead of stderr
    #[arg(short = 'l', long = "log")]
    log: Option<PathBuf>,

    /// Decode and route everything, write nothing
    #[arg(long = "dry")]
    dry: bool,

    /// Glob of input files
    #[arg(long)]
    pattern: Option<String>,

    /// memcached address for idfa devices
    #[arg(long)]
    idfa: Option<String>,

    /// memcached address for gaid devices
    #[arg(long)]
    gaid: Option<String>,

    /// memcached address for adid devices
    #[arg(long)]
    adid: Option<String>,

    /// memcached address for dvid devices
    #[arg(long)]
    dvid: Option<String>,

    /// TOML config file (defaults to ./memc-load.toml when it exists)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Worker tasks per file
    #[arg(long)]
    workers: Option<usize>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let destinations: BTreeMap<String, String> = [
            ("idfa", &self.idfa),
            ("gaid", &self.gaid),
            ("adid", &self.adid),
            ("dvid", &self.dvid),
        ]
        .into_iter()
        .filter_map(|(dev_type, address)| address.clone().map(|address| (dev_type.to_string(), address)))
        .collect();

        ConfigOverrides {
            pattern: self.pattern.clone(),
            dry_run: self.dry,
            destinations,
            workers: self.workers,
        }
    }
}

/// 📡 RUST_LOG wins. Otherwise `info`, or `debug` when dry-running so the would-be writes show up.
fn init_tracing(cli: &Cli) -> Result<()> {
    let default_level = if cli.dry { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match &cli.log {
        Some(log_path) => {
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .with_context(|| format!("💀 Could not open log file '{}' for appending", log_path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(log_file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// 🔒 An explicit `--config` has to exist. The default one only gets used if it happens to.
fn resolve_config_file(cli: &Cli) -> Result<Option<PathBuf>> {
    match &cli.config {
        Some(config_file) => {
            let exists = config_file.try_exists().with_context(|| {
                format!(
                    "💀 Could not check whether the configuration file exists. Was checking here: '{}'",
                    config_file.display()
                )
            })?;
            if !exists {
                anyhow::bail!(
                    "💀 Configuration file not found: '{}'. Relative paths start from the current directory, \
                     so an absolute path is the way to be absolutely certain.",
                    config_file.display()
                );
            }
            Ok(Some(config_file.clone()))
        }
        None => {
            let default_file = Path::new(DEFAULT_CONFIG_FILE);
            Ok(default_file.is_file().then(|| default_file.to_path_buf()))
        }
    }
}

async fn load(cli: &Cli) -> Result<()> {
    let config_file = resolve_config_file(cli)?;
    let app_config = load_config(config_file.as_deref(), &cli.overrides())
        .context("💀 Couldn't load the configuration. Take a look at the file, the MEMC_LOAD_* env vars, and the flags")?;
    info!("🦆 Memc loader started with options: {:?}", app_config);

    let started = Instant::now();
    let report = memc_load::run(app_config).await?;
    println!("{}", report.render_table());
    info!("⏱️ Loaded {} file(s) in {:.2?}", report.files.len(), started.elapsed());
    Ok(())
}

/// 🚀 main(): where it all begins. The "I pressed enter and held my breath" moment.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(&cli) {
        eprintln!("💀 {err:#}");
        std::process::exit(1);
    }

    if cli.test {
        match memc_load::self_test::run_self_test() {
            Ok(()) => {
                info!("✅ Self-test passed");
                return;
            }
            Err(err) => {
                error!("💀 Self-test failed: {:#}", err);
                std::process::exit(1);
            }
        }
    }

    if let Err(err) = load(&cli).await {
        error!("💀 Unexpected error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
        }
        // 🗑️ Exit with prejudice. Process exitus maximus.
        std::process::exit(1);
    }
}
