//! Duet peer CLI
//!
//! # Usage
//!
//! ```bash
//! # Wait in room R1 and save the first payload that arrives
//! duet-peer --room R1 receive --output-dir ./downloads
//!
//! # Join R1 and stream a file, stopping after ten seconds
//! duet-peer --room R1 send ./video.mp4 --max-duration-ms 10000
//!
//! # Upload connection stats to the server on exit
//! duet-peer --room R1 --stats-name run-1 receive --output-dir ./downloads
//! ```

use bytes::Bytes;
use clap::{Parser, Subcommand};
use duet_core::events::TransferDirection;
use duet_core::paths::sanitize_component;
use duet_core::PeerEvent;
use duet_webrtc::{PeerConfig, PeerSession};
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type BoxError = Box<dyn std::error::Error>;

/// Duet peer
///
/// Meets a partner in a signaling room and exchanges payloads over WebRTC.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Signaling server URL
    #[arg(long, default_value = "ws://localhost:8080", env = "DUET_SIGNALING_URL")]
    signaling_url: String,

    /// Room to join
    #[arg(long, env = "DUET_ROOM")]
    room: String,

    /// STUN server URL (repeatable; none for host-only connectivity)
    #[arg(long = "stun-server", env = "DUET_STUN_SERVERS", value_delimiter = ',')]
    stun_servers: Vec<String>,

    /// Upload collected stats under this name before exiting
    #[arg(long, env = "DUET_STATS_NAME")]
    stats_name: Option<String>,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false, env = "DUET_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a file once the partner is connected
    Send {
        /// File to send
        file: PathBuf,

        /// Name announced to the partner (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        /// Stop streaming after this many milliseconds
        #[arg(long)]
        max_duration_ms: Option<u64>,
    },

    /// Save received payloads to a directory
    Receive {
        /// Directory payloads are written to
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Exit after this many payloads
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

fn main() -> Result<(), BoxError> {
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
        .thread_name("duet-peer")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_rx))
}

async fn async_main(args: Args, shutdown_rx: watch::Receiver<bool>) -> Result<(), BoxError> {
    init_tracing(args.log_json)?;

    let mut config =
        PeerConfig::new(args.signaling_url, args.room).with_stun_servers(args.stun_servers);
    if let Command::Send {
        max_duration_ms, ..
    } = &args.command
    {
        config.transfer.max_duration_ms = *max_duration_ms;
    }

    info!(
        signaling_url = %config.signaling_url,
        room = %config.room_id,
        chunk_size = config.transfer.chunk_size,
        "Starting peer"
    );

    let (session, mut events) = PeerSession::connect(config).await?;

    let outcome = match args.command {
        Command::Send { file, name, .. } => {
            run_send(&session, &mut events, shutdown_rx, file, name).await
        }
        Command::Receive { output_dir, count } => {
            run_receive(&mut events, shutdown_rx, output_dir, count).await
        }
    };

    if let Some(name) = args.stats_name {
        match session.upload_stats(&name) {
            Ok(samples) => info!(name, samples, "Stats uploaded"),
            Err(e) => warn!("Stats upload failed: {}", e),
        }
    }

    session.close().await;
    outcome
}

async fn run_send(
    session: &PeerSession,
    events: &mut mpsc::Receiver<PeerEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    file: PathBuf,
    name: Option<String>,
) -> Result<(), BoxError> {
    let payload = Bytes::from(tokio::fs::read(&file).await?);
    let name = name.unwrap_or_else(|| {
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "payload".to_string())
    });

    info!(name, size = payload.len(), "Waiting for a connected partner");

    loop {
        tokio::select! {
            _ = shutdown_rx.wait_for(|stop| *stop) => return Err("interrupted".into()),
            event = events.recv() => match event {
                Some(PeerEvent::PeerConnected) => break,
                Some(PeerEvent::RoomFull) => return Err("room is full".into()),
                Some(event) => log_event(&event),
                None => return Err("session ended".into()),
            },
        }
    }

    let send = session.send_payload(&name, payload);
    tokio::pin!(send);

    loop {
        tokio::select! {
            result = &mut send => {
                let report = result?;
                info!(
                    name = %report.name,
                    bytes = report.bytes_sent,
                    chunks = report.chunks,
                    pauses = report.pauses,
                    truncated = report.truncated,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Send finished"
                );
                return Ok(());
            }
            _ = shutdown_rx.wait_for(|stop| *stop) => return Err("interrupted".into()),
            Some(event) = events.recv() => log_event(&event),
        }
    }
}

async fn run_receive(
    events: &mut mpsc::Receiver<PeerEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    output_dir: PathBuf,
    count: usize,
) -> Result<(), BoxError> {
    tokio::fs::create_dir_all(&output_dir).await?;
    let mut received = 0usize;

    info!(output_dir = %output_dir.display(), count, "Waiting for payloads");

    while received < count {
        tokio::select! {
            _ = shutdown_rx.wait_for(|stop| *stop) => return Err("interrupted".into()),
            event = events.recv() => match event {
                Some(PeerEvent::PayloadReceived { name, data }) => {
                    let path = output_dir.join(sanitize_component(&name));
                    tokio::fs::write(&path, &data).await?;
                    received += 1;
                    info!(name, bytes = data.len(), path = %path.display(), "Payload saved");
                }
                Some(PeerEvent::RoomFull) => return Err("room is full".into()),
                Some(event) => log_event(&event),
                None => return Err("session ended".into()),
            },
        }
    }

    Ok(())
}

fn log_event(event: &PeerEvent) {
    match event {
        PeerEvent::TransferProgress(progress) => {
            let direction = match progress.direction {
                TransferDirection::Outbound => "sent",
                TransferDirection::Inbound => "received",
            };
            info!(
                name = %progress.name,
                transferred = progress.transferred,
                total = progress.total,
                "{} {:.1}%",
                direction,
                progress.fraction() * 100.0
            );
        }
        PeerEvent::TransferFailed { direction, message } => {
            warn!(?direction, "Transfer failed: {}", message);
        }
        PeerEvent::PeerDisconnected { reason } => {
            warn!(reason = ?reason, "Peer disconnected");
        }
        PeerEvent::Error { message } => warn!("{}", message),
        other => info!(event = other.name(), "Session event"),
    }
}

fn init_tracing(json: bool) -> Result<(), BoxError> {
    // RUST_LOG overrides the default level
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info,webrtc=warn"))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }
    Ok(())
}
