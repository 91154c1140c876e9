//! Board CLI - runs the shared task board server.

use anyhow::{Context, Result};
use board_core::{Clock, SystemClock};
use board_server::{BoardConfig, DEFAULT_CONFIG_FILE};
use board_storage::Database;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "board")]
#[command(about = "Board - shared real-time task board", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the database
    Init {
        /// Directory to initialize (defaults to current directory)
        path: Option<PathBuf>,
    },

    /// Start the HTTP server
    Serve {
        /// Config file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Port to listen on, overrides the config file
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind, overrides the config file
        #[arg(short, long)]
        bind: Option<String>,

        /// Database file, overrides the config file
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Respace every active task's sort key
    Rebalance {
        /// Config file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Database file, overrides the config file
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { path } => cmd_init(&path.unwrap_or_else(|| PathBuf::from("."))).await,

        Commands::Serve {
            config,
            port,
            bind,
            db,
        } => {
            let mut config = load_config(&config)?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(db) = db {
                config.database.path = db;
            }

            println!(
                "{} {}",
                "Task board running at".green().bold(),
                format!("http://{}", config.server.address()).bright_cyan()
            );
            println!("Press Ctrl+C to stop");

            board_server::run(config).await
        }

        Commands::Rebalance { config, db } => {
            let mut config = load_config(&config)?;
            if let Some(db) = db {
                config.database.path = db;
            }
            cmd_rebalance(&config).await
        }

        Commands::Version => {
            println!("board {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<BoardConfig> {
    BoardConfig::load_or_default(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

async fn cmd_init(target: &Path) -> Result<()> {
    let config_path = target.join(DEFAULT_CONFIG_FILE);
    if config_path.exists() {
        println!(
            "{} {}",
            "Config already exists:".yellow(),
            config_path.display()
        );
    } else {
        BoardConfig::write_default(&config_path)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
    }

    let config = load_config(&config_path)?;
    let db_path = target.join(&config.database.path);
    let db = Database::open(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    db.init_schema().await?;
    db.close().await?;

    info!(path = %target.display(), "Initialized task board");
    println!("{}", "✓ Initialized task board".green().bold());
    println!("  Config:   {}", config_path.display());
    println!("  Database: {}", db_path.display());
    Ok(())
}

async fn cmd_rebalance(config: &BoardConfig) -> Result<()> {
    let mut db = Database::open(&config.database.path)
        .await
        .with_context(|| {
            format!(
                "Failed to open database at {}",
                config.database.path.display()
            )
        })?;
    db.init_schema().await?;

    let now = SystemClock.now_ms();
    let rewritten = db.rebalance(now).await?;
    db.close().await?;

    println!("{} {} keys rewritten", "✓ Rebalanced:".green().bold(), rewritten);
    Ok(())
}
