//! Parlor server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with self-signed certificate and in-memory mirror (development)
//! parlor-server --bind 0.0.0.0:4433
//!
//! # Start with TLS certificate and a durable mirror (production)
//! parlor-server --bind 0.0.0.0:4433 --cert cert.pem --key key.pem --state-dir /var/lib/parlor
//! ```

use std::path::PathBuf;

use clap::Parser;
use parlor_server::{
    DriverConfig, MemoryStorage, RedbStorage, Server, ServerRuntimeConfig, Storage,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parlor presence and room-messaging server
#[derive(Parser, Debug)]
#[command(name = "parlor-server")]
#[command(about = "Parlor presence and room-messaging server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<String>,

    /// Directory for the durable state mirror (omit for in-memory only)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Parlor server starting");
    tracing::info!("Binding to {}", args.bind);

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("No TLS certificate provided - using self-signed certificate");
        tracing::warn!("This is NOT suitable for production use!");
    }

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        driver: DriverConfig { max_connections: args.max_connections },
    };

    match args.state_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let storage = RedbStorage::open(dir.join("parlor.redb"))?;
            serve(config, storage).await
        },
        None => serve(config, MemoryStorage::new()).await,
    }
}

/// Bind and run the server with the chosen mirror backend.
async fn serve<S: Storage>(
    config: ServerRuntimeConfig,
    storage: S,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::bind(config, storage)?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
