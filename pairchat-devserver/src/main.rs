//! `PairChat` development server -- in-memory backend for local work.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 127.0.0.1:8000
//! cargo run --bin pairchat-devserver
//!
//! # Run on custom address
//! cargo run --bin pairchat-devserver -- --bind 0.0.0.0:9000
//! ```

use clap::Parser;
use pairchat_devserver::server;

/// CLI arguments for the dev server.
#[derive(Parser, Debug)]
#[command(version, about = "In-memory development backend for PairChat")]
struct CliArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8000", env = "PAIRCHAT_DEV_BIND")]
    bind: String,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PAIRCHAT_DEV_LOG")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match server::start_server(&cli.bind).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "dev server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "dev server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start dev server");
            std::process::exit(1);
        }
    }
}
