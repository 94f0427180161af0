//! snipbin Server Binary
//!
//! # Examples
//!
//! ```bash
//! # Start server with defaults
//! snipbin serve
//!
//! # Override bind address and configuration file
//! snipbin --config snipbin.toml serve --bind 0.0.0.0 --port 9000
//!
//! # Show the effective configuration
//! snipbin print-config
//! ```

use clap::{Args, Parser, Subcommand};
use snipbin::server::start_server;
use snipbin::{Config, MemoryBackend, SnippetStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// snipbin - self-expiring snippet store
#[derive(Parser, Debug)]
#[command(name = "snipbin")]
#[command(version = snipbin::VERSION)]
#[command(about = "Self-expiring snippet store", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "SNIPBIN_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "SNIPBIN_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),

    /// Print the effective configuration as TOML
    PrintConfig,

    /// Show version
    Version,
}

/// Server arguments, overriding the configuration file
#[derive(Args, Debug)]
struct ServeArgs {
    /// HTTP bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Identifier length
    #[arg(long)]
    ident_size: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(ref args) => {
            setup_logging(&cli)?;
            let config = Config::load(cli.config.as_deref())?;
            serve_command(config, args).await
        }
        Commands::PrintConfig => {
            let config = Config::load(cli.config.as_deref())?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Version => {
            println!("snipbin {}", snipbin::VERSION);
            Ok(())
        }
    }
}

/// Setup logging with rolling files and console output
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "snipbin.log");

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(!cli.no_color),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

/// Serve command - start the snipbin server
async fn serve_command(mut config: Config, args: &ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(size) = args.ident_size {
        config.store.ident_size = size;
    }
    config.validate()?;

    info!("🚀 snipbin starting...");
    info!(version = %snipbin::VERSION, "Version information");

    let backend = MemoryBackend::with_config(&config.store);
    let store = SnippetStore::new(Arc::new(backend), &config.store);
    info!(
        ident_size = config.store.ident_size,
        max_attempts = config.store.max_allocation_attempts,
        cleanup_interval_secs = config.store.cleanup_interval_secs,
        "✅ In-memory store initialized"
    );

    start_server(config.server, store).await
}
