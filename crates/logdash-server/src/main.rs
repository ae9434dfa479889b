//! logdash - log dashboard backend
//!
//! Watches a directory of per-project, per-day log files and serves them to
//! the dashboard over HTTP.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use logdash_server::{DashboardConfig, DashboardServer};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "logdash")]
#[command(about = "Log dashboard backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),

    /// Write a config file with every default spelled out
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "logdash.json")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Path to a JSON config file
    #[arg(short, long, env = "LOGDASH_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "LOGDASH_HOST")]
    host: Option<IpAddr>,

    /// Port to listen on
    #[arg(long, env = "LOGDASH_PORT")]
    port: Option<u16>,

    /// Root directory holding one sub-directory per project
    #[arg(long, env = "LOGDASH_LOG_ROOT")]
    log_root: Option<PathBuf>,

    /// Seconds between polling passes
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Number of records returned by the cache endpoint
    #[arg(long)]
    cache_lines: Option<usize>,
}

impl ServeArgs {
    fn into_config(self) -> anyhow::Result<DashboardConfig> {
        let mut config = match &self.config {
            Some(path) => DashboardConfig::from_file(path)?,
            None => DashboardConfig::default(),
        };

        if let Some(host) = self.host {
            config.bind_addr.set_ip(host);
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        if let Some(root) = self.log_root {
            config.engine.log_root = root;
        }
        if let Some(secs) = self.poll_interval {
            config.engine.poll_interval_secs = secs;
        }
        if let Some(lines) = self.cache_lines {
            config.engine.latest_limit = lines;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("logdash=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args.into_config()?).await?,
        Commands::InitConfig { output } => init_config(&output)?,
    }

    Ok(())
}

async fn serve(config: DashboardConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = config.bind_addr;
    if !config.engine.log_root.is_dir() {
        warn!(root = %config.engine.log_root.display(), "log root does not exist yet");
    }
    info!(
        addr = %addr,
        root = %config.engine.log_root.display(),
        poll_interval_secs = config.engine.poll_interval_secs,
        "starting logdash"
    );

    let server = DashboardServer::start(config)?;
    server
        .serve_with_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

fn init_config(output: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&DashboardConfig::default())?;
    std::fs::write(output, json)?;
    info!(path = %output.display(), "wrote default config");
    Ok(())
}
