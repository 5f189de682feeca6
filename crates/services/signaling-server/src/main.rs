//! Signaling server binary entry point
//!
//! # Usage
//!
//! ```bash
//! # Listen on all interfaces, port 8080
//! cargo run -p duet-signaling-server
//!
//! # Custom address, persist stats reports
//! cargo run -p duet-signaling-server -- \
//!   --bind-address 127.0.0.1:9000 \
//!   --report-dir ./reports
//! ```

use clap::Parser;
use duet_signaling_server::{ServerConfig, SignalingServer};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Duet signaling server
///
/// Two-party rooms over WebSocket: admits two peers per room and relays
/// their negotiation messages.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "DUET_BIND_ADDRESS")]
    bind_address: String,

    /// Directory for persisted stats reports (reports are rejected when unset)
    #[arg(long, env = "DUET_REPORT_DIR")]
    report_dir: Option<PathBuf>,

    /// Outbound frames queued per connection
    #[arg(long, default_value_t = 128, env = "DUET_OUTBOUND_BUFFER")]
    outbound_buffer: usize,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false, env = "DUET_LOG_JSON")]
    log_json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        if shutdown_tx.send_replace(true) {
            eprintln!("Shutdown already in progress, forcing exit");
            std::process::exit(130);
        }
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("duet-signaling")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_rx))
}

async fn async_main(
    args: Args,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(args.log_json)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Duet signaling server starting");

    let config = ServerConfig {
        bind_address: args.bind_address,
        report_dir: args.report_dir,
        outbound_buffer: args.outbound_buffer,
    };

    info!(
        bind_address = %config.bind_address,
        report_dir = ?config.report_dir,
        outbound_buffer = config.outbound_buffer,
        "Configuration loaded"
    );

    let handle = SignalingServer::new(config)?.start().await?;
    info!("Server running on {}. Press Ctrl+C to shutdown.", handle.url());

    shutdown_rx.wait_for(|stop| *stop).await?;
    info!("Shutdown signal received, cleaning up...");

    handle.shutdown().await;
    info!("Signaling server shut down gracefully");

    Ok(())
}

fn init_tracing(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG overrides the default level
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }
    Ok(())
}
