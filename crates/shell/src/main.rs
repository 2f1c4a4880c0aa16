//! Filecast - live directory listing for a desktop frontend

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use shell_lib::{Mode, Shell, ShellConfig};
use tracing::{info, warn};

/// Publishes the current directory's listing to the Filecast frontend
#[derive(Parser)]
#[command(name = "filecast")]
#[command(author, version, about, long_about = None)]
struct Cli {}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let _cli = Cli::parse();

    let config = ShellConfig::from_env().context("Failed to load configuration")?;
    let shell = Shell::start(config).await?;
    print_banner(&shell);

    let handle = shell.handle();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutting down...");
        handle.quit();
    });

    shell.run().await
}

fn print_banner(shell: &Shell) {
    let config = shell.config();
    let mode = match config.mode {
        Mode::Development => "development".yellow().to_string(),
        Mode::Production => "production".green().to_string(),
    };

    println!("{} {}", "Filecast".bold(), env!("CARGO_PKG_VERSION").dimmed());
    println!("  {} {}", "mode:".dimmed(), mode);
    println!("  {} {}", "root:".dimmed(), shell.root().display());
    println!("  {} {}", "port:".dimmed(), shell.local_addr().port().cyan());
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
