mod app;
mod collection;
mod export;
mod filter;
mod import;
mod session;
mod thumbnail;
mod ui;
mod utils;
mod view;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "starsort")]
#[command(author = "MrMattias")]
#[command(version)]
#[command(about = "Rate, filter and export large image folders from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Image directory to open on start
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Images per page in the collection list
    #[arg(short, long)]
    page_size: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the supported images in a directory
    Scan {
        /// Directory to scan
        dir: PathBuf,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Print a JSON array instead of one path per line
        #[arg(long)]
        json: bool,
    },
    /// Show the config file location and effective settings
    Config,
}

/// Log to a file while the TUI owns the terminal, to stderr otherwise.
fn init_logging(to_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_env("STARSORT_LOG")
        .unwrap_or_else(|_| EnvFilter::new("starsort=info"));

    match to_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Scan { dir, recursive, json }) => {
            init_logging(None)?;
            cmd_scan(&dir, recursive, json)
        }
        Some(Commands::Config) => cmd_config(),
        None => {
            init_logging(Some(&app::Config::log_path()))?;

            let mut config = app::Config::load()?;
            if let Some(page_size) = cli.page_size {
                config.thumbnails.page_size = page_size.max(1);
            }
            let dir = cli
                .dir
                .map(|d| utils::expand_tilde(&d.to_string_lossy()))
                .or_else(|| Some(config.library.directory.clone()).filter(|d| d.is_dir()));

            app::run_tui(config, dir)
        }
    }
}

fn cmd_scan(dir: &Path, recursive: bool, json: bool) -> Result<()> {
    let files = utils::list_supported_files(dir, recursive)?;
    let mut ids = utils::canonical_ids(files);
    ids.sort();

    if json {
        println!("{}", serde_json::to_string_pretty(&ids)?);
    } else {
        for id in &ids {
            println!("{}", id);
        }
        eprintln!("{} images in {}", ids.len(), dir.display());
    }

    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = app::Config::load()?;
    println!("# {}", app::Config::config_path().display());
    println!("# log: {}", app::Config::log_path().display());
    print!("{}", config.to_toml()?);
    Ok(())
}
