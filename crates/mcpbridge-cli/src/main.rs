//! mcpbridge - launcher for the M365 and ServiceNow connector services.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use mcpbridge_core::EnvFile;

#[derive(Parser)]
#[command(name = "mcpbridge")]
#[command(about = "MCP connector services for M365 family and ServiceNow")]
#[command(version)]
struct Cli {
    /// Bind address.
    #[arg(long, global = true, default_value = "0.0.0.0")]
    host: String,

    /// Path to the KEY=VALUE configuration file.
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// Directory for error.log and combined.log.
    #[arg(long, global = true, default_value = ".")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the M365 family service
    M365 {
        /// Port to listen on.
        #[arg(long, env = "PORT", default_value_t = 3001)]
        port: u16,
    },

    /// Run the ServiceNow service
    Snow {
        /// Port to listen on.
        #[arg(long, env = "PORT", default_value_t = 3002)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_dir)?;

    let env = EnvFile::new(&cli.env_file);
    match cli.command {
        Commands::M365 { port } => {
            let addr = bind_addr(&cli.host, port)?;
            let state = Arc::new(mcpbridge_m365::AppState::new(env)?);
            mcpbridge_m365::serve(state, addr).await?;
        }
        Commands::Snow { port } => {
            let addr = bind_addr(&cli.host, port)?;
            let state = Arc::new(mcpbridge_snow::AppState::new(env)?);
            mcpbridge_snow::serve(state, addr).await?;
        }
    }
    Ok(())
}

fn bind_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))
}

/// Install an stderr layer plus the two file streams the services log to:
/// `error.log` (ERROR) and `combined.log` (INFO and up).
fn init_tracing(log_dir: &Path) -> anyhow::Result<()> {
    let open = |name: &str| -> anyhow::Result<std::fs::File> {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(name))
            .with_context(|| format!("cannot open {name} in {}", log_dir.display()))
    };
    let error_log = open("error.log")?;
    let combined_log = open("combined.log")?;

    tracing_subscriber::registry()
        .with(
            fmt::layer().with_writer(std::io::stderr).with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            ),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(error_log))
                .with_filter(LevelFilter::ERROR),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(combined_log))
                .with_filter(LevelFilter::INFO),
        )
        .init();
    Ok(())
}
