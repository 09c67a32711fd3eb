mod app;

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use rkconfig::Config;
use rkutils::get_os_string;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::app::App;

#[derive(Parser, Debug)]
#[command(name = "RetroKiosk")]
#[command(version)]
#[command(about = "Fullscreen media and retro-game kiosk")]
struct Cli {
    /// Configuration directory (defaults to $RETROKIOSK_CONFIG, then .retrokiosk)
    #[arg(short, long)]
    config: Option<String>,

    /// Playlist to start right away, by index
    #[arg(short, long)]
    playlist: Option<usize>,

    /// Log level or filter directives; overrides RUST_LOG and the configuration
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_tracing(config: &Config, cli_level: Option<&str>) {
    let configured = config
        .get_log_min_level()
        .unwrap_or_else(|_| "info".to_string());
    let env_filter = match cli_level {
        Some(level) => EnvFilter::try_new(level),
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&configured)),
    }
    .unwrap_or_else(|_| EnvFilter::new("info"));

    let writer = if config.get_log_enable_console().unwrap_or(true) {
        BoxMakeWriter::new(io::stderr)
    } else {
        BoxMakeWriter::new(io::sink)
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_config(cli.config.as_deref().unwrap_or(""))
        .context("Cannot load configuration")?;
    init_tracing(&config, cli.log_level.as_deref());

    info!(os = %get_os_string(), config_dir = %config.directory(), "RetroKiosk starting");

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let mut app = App::new(&config)?;
    app.run(&running, cli.playlist);
    app.shutdown();

    Ok(())
}
