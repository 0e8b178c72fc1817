//! Relay-signaled WebRTC peer
//!
//! Negotiates a WebRTC session with a remote peer through an HTTP relay and
//! streams a synthetic video track. Remote tracks and data channel traffic
//! are logged.
//!
//! # Usage
//!
//! ```bash
//! # Peer that waits for an offer
//! cargo run --bin relay_signaling_peer -- \
//!   --relay-url http://localhost:3000 \
//!   --local-peer-id desktop \
//!   --remote-peer-id hololens
//!
//! # Peer that initiates
//! cargo run --bin relay_signaling_peer -- \
//!   --relay-url http://localhost:3000 \
//!   --local-peer-id hololens \
//!   --remote-peer-id desktop \
//!   --offer
//! ```

use anyhow::Context;
use clap::Parser;
use bytes::Bytes;
use remotemedia_relay_signaling::media::{TrackKind, VideoFrame};
use remotemedia_relay_signaling::{
    ConnectionRegistry, DataChannelConfig, DataChannelId, DataChannelInfo, DataChannelState,
    EngineObserver, HttpRelayClient, IceCandidate, ObserverSet, PeerConnection, RelaySignaler,
    RelaySignalingConfig, VideoTrackSource, WebRtcEngine,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Processing loop period
const TICK: Duration = Duration::from_millis(10);

/// Synthetic frame period (~30 fps)
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// RemoteMedia relay signaling peer
///
/// Unset options fall back to the `RELAY_SIGNALING_*` environment variables,
/// then to the built-in defaults.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay base URL
    #[arg(long)]
    relay_url: Option<String>,

    /// Relay key this peer polls (random UUID if omitted)
    #[arg(long)]
    local_peer_id: Option<String>,

    /// Relay key of the remote peer
    #[arg(long)]
    remote_peer_id: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<f64>,

    /// Relay request timeout in milliseconds
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// STUN servers (comma-separated)
    #[arg(long, value_delimiter = ',')]
    stun_servers: Option<Vec<String>>,

    /// Send an offer at startup
    #[arg(long, default_value_t = false)]
    offer: bool,

    /// Send a new offer whenever the connection asks for renegotiation
    #[arg(long, default_value_t = false)]
    auto_renegotiate: bool,

    /// Add a local audio track
    #[arg(long, default_value_t = false)]
    audio: bool,

    /// Do not add the synthetic video track
    #[arg(long, default_value_t = false)]
    no_video: bool,

    /// Open a data channel with this label
    #[arg(long)]
    data_channel: Option<String>,
}

impl Args {
    /// Environment-derived config with command-line overrides applied
    fn into_config(self) -> RelaySignalingConfig {
        let mut config = RelaySignalingConfig::default().from_env();
        if let Some(relay_url) = self.relay_url {
            config.relay_url = relay_url;
        }
        if let Some(local_peer_id) = self.local_peer_id {
            config.local_peer_id = Some(local_peer_id);
        }
        if let Some(remote_peer_id) = self.remote_peer_id {
            config.remote_peer_id = remote_peer_id;
        }
        if let Some(poll_interval_ms) = self.poll_interval_ms {
            config.poll_interval_ms = poll_interval_ms;
        }
        if let Some(request_timeout_ms) = self.request_timeout_ms {
            config.request_timeout_ms = request_timeout_ms;
        }
        if let Some(stun_servers) = self.stun_servers {
            config.stun_servers = stun_servers;
        }
        if self.auto_renegotiate {
            config.auto_renegotiate = true;
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);
    ctrlc::set_handler(move || {
        if shutdown_flag_handler.swap(true, Ordering::SeqCst) {
            eprintln!("Shutdown already in progress, forcing exit");
            std::process::exit(0);
        }
        eprintln!("\nCtrl+C received, shutting down...");
    })
    .context("failed to set Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("relay-signaling-worker")
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let offer = args.offer;
    let audio = args.audio;
    let no_video = args.no_video;
    let data_channel = args.data_channel.clone();
    let config = args.into_config();
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        relay_url = %config.relay_url,
        remote_peer_id = %config.remote_peer_id,
        poll_interval_ms = config.poll_interval_ms,
        "Relay signaling peer starting"
    );

    let registry = ConnectionRegistry::new();
    let engine = WebRtcEngine::new(runtime.handle().clone(), &config)?;
    let connection = PeerConnection::new(&registry, Arc::new(engine));

    let source = VideoTrackSource::new("synthetic");
    if !no_video {
        connection.add_local_video_track("local_video_track", Arc::clone(&source))?;
    }
    if audio {
        connection.add_local_audio_track("local_audio_track")?;
    }

    let relay = HttpRelayClient::new(
        &config.relay_url,
        Duration::from_millis(config.request_timeout_ms),
    )?;
    let mut signaler = RelaySignaler::new(
        config,
        Arc::new(relay),
        runtime.handle().clone(),
        connection,
    )?;
    signaler.peer().set_observer(Arc::new(
        ObserverSet::new()
            .with(Arc::new(signaler.handle()))
            .with(Arc::new(MediaEventLog)),
    ));
    if let Some(label) = data_channel {
        signaler
            .peer()
            .add_data_channel(&DataChannelConfig::new(label))?;
    }

    info!("Local peer id: {}", signaler.identity().local_id());

    if offer {
        signaler.start_offer()?;
    }

    let generator = spawn_frame_generator(Arc::clone(&source), Arc::clone(&shutdown_flag));

    // Processing context: all signaling state is touched only here
    let mut last = Instant::now();
    while !shutdown_flag.load(Ordering::SeqCst) {
        let now = Instant::now();
        signaler.update(now.duration_since(last).as_secs_f64() * 1000.0);
        last = now;
        std::thread::sleep(TICK);
    }

    signaler.shutdown();
    signaler.drain();
    if let Err(e) = signaler.peer_mut().close() {
        warn!("Error closing connection: {}", e);
    }
    drop(signaler);

    if generator.join().is_err() {
        warn!("Frame generator thread panicked");
    }

    info!("Relay signaling peer stopped");
    Ok(())
}

/// Logs remote media and data channel events
struct MediaEventLog;

impl EngineObserver for MediaEventLog {
    fn on_ice_candidate(&self, _candidate: IceCandidate) {}

    fn on_renegotiation_needed(&self) {}

    fn on_connected(&self) {}

    fn on_remote_track_added(&self, kind: TrackKind) {
        info!("Receiving remote {:?} track", kind);
    }

    fn on_remote_track_removed(&self, kind: TrackKind) {
        info!("Remote {:?} track ended", kind);
    }

    fn on_data_channel_added(&self, channel: &DataChannelInfo) {
        info!("Data channel {} ({}) added", channel.label, channel.id);
    }

    fn on_data_channel_removed(&self, channel: &DataChannelInfo) {
        info!("Data channel {} ({}) removed", channel.label, channel.id);
    }

    fn on_data_channel_state_change(&self, id: DataChannelId, state: DataChannelState) {
        info!("Data channel {} is {:?}", id, state);
    }

    fn on_data_channel_message(&self, id: DataChannelId, data: Bytes) {
        info!(
            "Data channel {} message ({} bytes): {}",
            id,
            data.len(),
            String::from_utf8_lossy(&data)
        );
    }
}

/// Push a 16x16 grey frame into `source` until shutdown
fn spawn_frame_generator(
    source: Arc<VideoTrackSource>,
    shutdown_flag: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let start = Instant::now();
        while !shutdown_flag.load(Ordering::SeqCst) {
            let timestamp_us = start.elapsed().as_micros() as u64;
            source.deliver_frame(&VideoFrame::filled(16, 16, 0xFF7F_7F7F, timestamp_us));
            std::thread::sleep(FRAME_INTERVAL);
        }
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
