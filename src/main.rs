use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use evm_sandbox::executor::Sandbox;
use evm_sandbox::rpc::ApiServer;
use evm_sandbox::Config;

#[derive(Parser)]
#[command(name = "evm-sandbox")]
#[command(about = "Deploy and call EVM bytecode against an in-memory world state", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overrides the configured log level
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the sandbox over HTTP
    Run {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listen host
        #[arg(long)]
        host: Option<String>,

        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the default configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config => {
            print!("{}", Config::default().to_toml()?);
            Ok(())
        }

        Commands::Run { config, host, port } => {
            let mut config = match config {
                Some(path) => Config::from_file(path)?,
                None => Config::default(),
            };
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(level) = cli.log_level {
                config.log.level = level;
            }
            config.validate()?;

            init_logging(&config);

            let mut runtime = tokio::runtime::Builder::new_multi_thread();
            runtime
                .enable_all()
                .thread_name("evm-sandbox");
            if let Some(workers) = config.server.worker_threads {
                runtime.worker_threads(workers);
            }
            let runtime = runtime.build().context("Failed to build async runtime")?;

            runtime.block_on(run(config))
        }
    }
}

fn init_logging(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    if config.log.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(config: Config) -> Result<()> {
    let addr = config.listen_addr()?;
    let sandbox = Arc::new(Sandbox::new(config.sandbox_config()?));

    info!(
        version = evm_sandbox::VERSION,
        chain_id = config.block.chain_id,
        block = config.block.number,
        max_call_depth = config.execution.max_call_depth,
        "starting EVM sandbox"
    );

    ApiServer::new(addr, sandbox)
        .with_cors(config.server.cors)
        .run(shutdown_signal())
        .await
        .with_context(|| format!("HTTP server on {} failed", addr))?;

    info!("Shutting down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(%err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
