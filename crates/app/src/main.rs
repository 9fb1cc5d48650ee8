use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use bizscan_core::config::LoggingConfig;
use bizscan_core::AppConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

const CONFIG_ENV: &str = "BIZSCAN_CONFIG";
const API_KEY_ENV: &str = "BIZSCAN_VISION_API_KEY";
const CONFIG_FILE_NAME: &str = "bizscan.toml";

/// Normalize scanned business documents and check their registration status
#[derive(Parser, Debug)]
#[command(name = "bizscan")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults: $BIZSCAN_CONFIG, ./bizscan.toml, platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize the input directory, then recognize and look up every page
    Run {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Only flatten PDFs and images into single-page images
    Normalize {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        target: Option<PathBuf>,
    },
    /// Only run recognition and lookup over an already-normalized directory
    Batch {
        #[arg(long)]
        pages: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Look up one business number (DDD-DD-DDDDD)
    Lookup { identifier: String },
    /// Print the largest aspect-preserving size within bounds, optionally resizing to it
    Fit {
        image: PathBuf,
        #[arg(long)]
        max_width: u32,
        #[arg(long)]
        max_height: u32,
        /// png or jpeg
        #[arg(long, default_value = "png")]
        format: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging)?;

    match cli.command {
        Command::Run { input, output } => commands::run(config, input, output),
        Command::Normalize { input, target } => commands::normalize(config, input, target),
        Command::Batch { pages, output } => commands::batch(config, pages, output),
        Command::Lookup { identifier } => commands::lookup(&config, &identifier),
        Command::Fit { image, max_width, max_height, format, out } => {
            commands::fit(&image, max_width, max_height, &format, out.as_deref())
        }
    }
}

fn config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(Some(PathBuf::from(path)));
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(Some(local));
    }
    Ok(directories::ProjectDirs::from("com", "bizscan", "bizscan")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
        .filter(|p| p.is_file()))
}

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let mut config = match config_path(explicit)? {
        Some(path) => AppConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        config.ocr.api_key = Some(key);
    }
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("invalid log level {:?}", logging.level))?,
    };

    match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}
