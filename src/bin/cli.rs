//! Administrative and demo front end for the `photocat` catalog engine:
//! scan a real directory end to end, list catalogued folders, or run the
//! deterministic synthetic-data mock coordinator.

mod config;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use photocat::collab::{Decoder, FolderPicker};
use photocat::config::Config as EngineConfig;
use photocat::coordinator::Coordinator;
use photocat::error::{CatalogError, Result};
use photocat::mock::MockCoordinator;
use photocat::priority::Priority;
use photocat::CatalogApi;

use config::CliConfig;
use ui::{Theme, Ui};

#[derive(Parser)]
#[command(name = "photocat-cli", about = "Scan, inspect, and demo the photocat catalog engine")]
struct Cli {
    /// Path to a TOML config file; defaults to the platform config directory.
    #[arg(long, env = "PHOTOCAT_CONFIG")]
    config: Option<PathBuf>,

    /// Named profile from the config file to apply on top of the defaults.
    #[arg(long, env = "PHOTOCAT_PROFILE")]
    profile: Option<String>,

    /// Color theme for terminal output.
    #[arg(long, value_enum, default_value_t = ThemeArg::Auto)]
    theme: ThemeArg,

    /// Suppress decorative output; print plain lines only.
    #[arg(long)]
    quiet: bool,

    /// `tracing` env-filter directive, e.g. "info" or "photocat=debug".
    #[arg(long, env = "PHOTOCAT_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ThemeArg {
    Auto,
    Light,
    Dark,
    Plain,
}

impl From<ThemeArg> for Theme {
    fn from(value: ThemeArg) -> Self {
        match value {
            ThemeArg::Auto => Theme::Auto,
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
            ThemeArg::Plain => Theme::Plain,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory end to end: catalog its folder, ingest assets, and
    /// report counts.
    Scan {
        /// Directory to scan.
        folder: PathBuf,
        /// Catalog database path (defaults to `<cache-root>/catalog.sqlite3`).
        #[arg(long)]
        db: Option<PathBuf>,
        /// Root directory for the derivative caches and handle store.
        #[arg(long)]
        cache_root: Option<PathBuf>,
    },
    /// List catalogued folders.
    Recent {
        /// Catalog database path (defaults to `<cache-root>/catalog.sqlite3`).
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Run the deterministic synthetic-library mock coordinator and report
    /// a sample of generated assets and a few thumbnail requests.
    Demo {
        /// Seed for the synthetic library generator.
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Number of synthetic assets to generate.
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
}

/// Decoder used by the `scan` subcommand: it never renders derivatives
/// during a scan, but the coordinator's constructor requires one.
struct NullDecoder;

#[async_trait::async_trait]
impl Decoder for NullDecoder {
    async fn render_thumbnail(&self, source: Bytes, _target_size: u32) -> Result<Bytes> {
        Ok(source)
    }

    async fn render_edited_thumbnail(&self, source: Bytes, _edit: Bytes, _target_size: u32) -> Result<Bytes> {
        Ok(source)
    }

    async fn render_preview(&self, source: Bytes, _edit: Option<Bytes>, _target_size: u32) -> Result<Bytes> {
        Ok(source)
    }
}

/// Folder picker used by the `scan` subcommand, which opens a folder by
/// explicit path rather than prompting, so this is never actually invoked.
struct NullFolderPicker;

#[async_trait::async_trait]
impl FolderPicker for NullFolderPicker {
    async fn pick_folder(&self) -> Result<Option<Arc<dyn photocat::collab::DirectoryHandle>>> {
        Err(CatalogError::Unknown(
            "photocat-cli does not support interactive folder selection".into(),
        ))
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    photocat::logging::init_logging(&cli.log_level).ok();
    let ui = Ui::new(cli.theme.into(), cli.quiet);

    let cli_config = CliConfig::load(cli.config.clone())?;
    let profile_name = cli.profile.clone().or_else(|| cli_config.default_profile_name().map(str::to_string));
    let mut engine_config = EngineConfig::default();
    let mut profile_db = None;
    let mut profile_cache_root = None;
    if let Some(name) = &profile_name {
        if let Some(profile) = cli_config.profile(name) {
            if let Some(v) = profile.thumbnail_memory_capacity {
                engine_config.thumbnail_memory_capacity = v;
            }
            if let Some(v) = profile.preview_memory_capacity {
                engine_config.preview_memory_capacity = v;
            }
            if let Some(v) = profile.thumbnail_concurrency {
                engine_config.thumbnail_concurrency = v;
            }
            if let Some(v) = profile.preview_concurrency {
                engine_config.preview_concurrency = v;
            }
            if let Some(v) = profile.scan_batch_size {
                engine_config.scan_batch_size = v;
            }
            profile_db = profile.database.clone();
            profile_cache_root = profile.cache_root.clone();
        } else {
            ui.warn(&format!("unknown profile '{name}', using defaults"));
        }
    }

    match cli.command {
        Command::Scan { folder, db, cache_root } => {
            run_scan(&ui, engine_config, folder, db.or(profile_db), cache_root.or(profile_cache_root)).await?
        }
        Command::Recent { db } => {
            run_recent(&ui, db.or(profile_db), profile_cache_root).await?
        }
        Command::Demo { seed, count } => run_demo(&ui, seed, count).await?,
    }

    Ok(())
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("photocat"))
        .unwrap_or_else(|| PathBuf::from(".photocat-cache"))
}

async fn run_scan(
    ui: &Ui,
    engine_config: EngineConfig,
    folder: PathBuf,
    db: Option<PathBuf>,
    cache_root: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cache_root = cache_root.unwrap_or_else(default_cache_root);
    let db_path = db.unwrap_or_else(|| cache_root.join("catalog.sqlite3"));
    let handles_path = cache_root.join("handles.json");

    let coordinator = Arc::new(Coordinator::new(
        engine_config,
        db_path,
        handles_path,
        cache_root.join("derivatives"),
        Arc::new(NullDecoder),
        Arc::new(NullFolderPicker),
    )?);
    coordinator.attach();

    let task = ui.task(format!("scanning {}", folder.display()));
    coordinator.open_folder_path(folder).await?;
    task.finish();

    let assets = coordinator.assets();
    ui.section(
        "Scan summary",
        [("assets ingested", assets.len().to_string())],
    );
    ui.success("scan complete");
    Ok(())
}

async fn run_recent(
    ui: &Ui,
    db: Option<PathBuf>,
    cache_root: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cache_root = cache_root.unwrap_or_else(default_cache_root);
    let db_path = db.unwrap_or_else(|| cache_root.join("catalog.sqlite3"));
    let handles_path = cache_root.join("handles.json");
    let coordinator = Arc::new(Coordinator::new(
        EngineConfig::default(),
        db_path,
        handles_path,
        cache_root.join("derivatives"),
        Arc::new(NullDecoder),
        Arc::new(NullFolderPicker),
    )?);
    coordinator.attach();

    let folders = coordinator.list_recent_folders()?;
    ui.list(
        "Recent folders",
        folders.into_iter().map(|f| {
            format!(
                "{} ({}) — accessible: {}",
                f.name, f.path, f.is_accessible
            )
        }),
    );
    Ok(())
}

async fn run_demo(ui: &Ui, seed: u64, count: usize) -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let coordinator = Arc::new(MockCoordinator::new(dir.path(), seed, count)?);
    coordinator.attach();

    let assets = coordinator.assets();
    ui.section(
        "Synthetic library",
        [("assets generated", assets.len().to_string())],
    );

    for asset in assets.iter().take(5) {
        coordinator.request_thumbnail(&asset.id, Priority::Visible);
    }
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let ready = coordinator
        .assets()
        .into_iter()
        .filter(|a| matches!(a.thumbnail, photocat::model::DerivativeState::Ready(_)))
        .count();
    ui.section("Thumbnail requests", [("ready", ready.to_string())]);
    ui.success("demo complete");
    Ok(())
}
