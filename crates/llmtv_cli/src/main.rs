//! LLMTV command-line front end.
//!
//! Usage:
//!   llmtv generate "cats on a night train" --style synthwave
//!   llmtv cache clear
//!   llmtv config init

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

use llmtv_core::cache::ArtifactCache;
use llmtv_core::config::ConfigManager;
use llmtv_core::logging::{init_tracing_with_file, LogLevel};
use llmtv_core::models::Prompt;
use llmtv_core::orchestrator::{RunCallbacks, RunProcessor};
use llmtv_core::producer::SegmentProgress;
use llmtv_core::services::Services;

const DEFAULT_CONFIG: &str = ".config/llmtv.toml";

/// Turn a concept into a music video
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a music video for a concept
    Generate {
        /// What the song is about
        concept: String,
        /// Musical style, also used as the visual genre
        #[arg(short, long)]
        style: Option<String>,
        /// Lyrics model, as provider/model
        #[arg(short, long)]
        model: Option<String>,
        /// Ignore cached lyrics, music, transcripts and clips
        #[arg(long)]
        no_cache: bool,
        /// Keep the working directory after a successful run
        #[arg(long)]
        keep_intermediates: bool,
    },

    /// Cached artifact management
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Configuration file management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// Remove every cached artifact
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Write the configuration file with defaults for missing keys
    Init,
    /// Print the configuration file
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns whether the command succeeded.
async fn run(cli: Cli) -> Result<bool> {
    let mut manager = ConfigManager::new(&cli.config);
    manager
        .load_or_create()
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        manager.settings().logging.level
    };
    let _guard = init_tracing_with_file(level, &manager.logs_folder());
    tracing::debug!("Using configuration {}", manager.path().display());

    match cli.command {
        Commands::Generate {
            concept,
            style,
            model,
            no_cache,
            keep_intermediates,
        } => generate(manager, concept, style, model, no_cache, keep_intermediates).await,
        Commands::Cache {
            command: CacheCommands::Clear,
        } => {
            let cache = ArtifactCache::new(&manager.settings().paths.cache_folder);
            let removed = cache.clear().context("clearing cache")?;
            println!("Removed {} cached entries from {}", removed, cache.dir().display());
            Ok(true)
        }
        Commands::Config { command } => {
            match command {
                ConfigCommands::Init => {
                    manager.ensure_dirs_exist()?;
                    println!("Configuration written to {}", manager.path().display());
                }
                ConfigCommands::Show => {
                    let content = std::fs::read_to_string(manager.path())
                        .with_context(|| format!("reading {}", manager.path().display()))?;
                    print!("{}", content);
                }
            }
            Ok(true)
        }
    }
}

async fn generate(
    mut manager: ConfigManager,
    concept: String,
    style: Option<String>,
    model: Option<String>,
    no_cache: bool,
    keep_intermediates: bool,
) -> Result<bool> {
    {
        let settings = manager.settings_mut();
        if let Some(model) = model {
            settings.services.lyrics_model = model;
        }
        if keep_intermediates {
            settings.paths.keep_intermediates = true;
        }
        if no_cache {
            settings.cache.enabled = false;
        }
    }
    manager.ensure_dirs_exist()?;
    let settings = manager.into_settings();

    let prompt = Prompt::new(concept, style)?;

    let mut services = Services::from_settings(&settings).context("configuring services")?;
    if settings.cache.enabled {
        let cache = ArtifactCache::new(&settings.paths.cache_folder);
        services = services.with_cache(Arc::new(cache));
    }

    let processor = RunProcessor::new(settings, services);

    let handle = processor.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling, waiting for in-flight requests to stop...");
            handle.cancel();
        }
    });

    let callbacks = RunCallbacks {
        progress: Some(Box::new(|stage: &str, percent: u32, message: &str| {
            println!("[{:>3}%] {}: {}", percent, stage, message);
        })),
        segment: Some(Arc::new(|progress: &SegmentProgress| {
            println!("        segment {}: {}", progress.segment_index, progress);
        })),
        ..Default::default()
    };

    let outcome = processor.run_with_callbacks(prompt, callbacks).await;

    match &outcome.result {
        Ok(video) => {
            println!();
            println!("Final video: {}", video.path.display());
            println!("Song:        {}", video.audio_path.display());
            println!(
                "Duration:    {:.2}s in {} segments",
                video.duration_secs,
                video.segment_count()
            );
            Ok(true)
        }
        Err(e) => {
            eprintln!();
            eprintln!("Run {} failed: {}", outcome.run_id, e);
            eprintln!("Working directory: {}", outcome.work_dir.display());
            if let Some(ref log) = outcome.log_path {
                eprintln!("Log: {}", log.display());
            }
            Ok(false)
        }
    }
}
