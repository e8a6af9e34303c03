//! CLI host for a lockstep session: wires a [`Session`] to a real UDP socket
//! and drives one receiver thread, one sender thread, and the calling thread
//! as the simulation loop, which waits on the barrier, then pops one frame
//! from each peer's queue in a fixed peer order and advances the tick.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lockstep_arq::config::{PeerId, SessionConfig};
use lockstep_arq::frame::FrameInput;
use lockstep_arq::session::Session;
use lockstep_arq::worker::{bind_socket, receiver, sender};

/// Run one lockstep peer: binds a socket, joins a fixed peer set, and ticks
/// the simulation loop, printing the inputs delivered each frame.
#[derive(Parser, Debug)]
#[command(name = "lockstep-demo", version, about)]
struct Args {
    /// This process's own peer id.
    #[arg(long)]
    peer_id: u32,

    /// Local address to bind the UDP socket to, e.g. 127.0.0.1:9000.
    #[arg(long)]
    bind: SocketAddr,

    /// Remote peers in `id@host:port` form, repeatable.
    #[arg(long = "peer", value_parser = parse_peer)]
    peers: Vec<(PeerId, SocketAddr)>,

    /// Frame number the session begins at.
    #[arg(long, default_value_t = 0)]
    initial_frame: i64,

    /// Retransmission timeout, milliseconds.
    #[arg(long, default_value_t = 100)]
    rto_ms: u64,

    /// Socket read timeout, milliseconds.
    #[arg(long, default_value_t = 50)]
    socket_timeout_ms: u64,

    /// Number of frames to run before exiting; 0 runs until interrupted.
    #[arg(long, default_value_t = 0)]
    frame_limit: u64,
}

fn parse_peer(raw: &str) -> Result<(PeerId, SocketAddr), String> {
    let (id, addr) = raw
        .split_once('@')
        .ok_or_else(|| format!("expected id@host:port, got {raw:?}"))?;
    let id: u32 = id.parse().map_err(|e| format!("bad peer id: {e}"))?;
    let addr: SocketAddr = addr.parse().map_err(|e| format!("bad address: {e}"))?;
    Ok((PeerId(id), addr))
}

fn main() {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let peer_ids: BTreeSet<PeerId> = args.peers.iter().map(|(id, _)| *id).collect();
    let mut config = SessionConfig::new(PeerId(args.peer_id), peer_ids, args.initial_frame);
    config.retransmission_timeout = Duration::from_millis(args.rto_ms);
    config.socket_read_timeout = Duration::from_millis(args.socket_timeout_ms);
    for (id, addr) in &args.peers {
        config = config.with_peer_addr(*id, *addr);
    }

    let socket = match bind_socket(args.bind, &config) {
        Ok(socket) => socket,
        Err(err) => {
            eprintln!("failed to bind {}: {err}", args.bind);
            std::process::exit(1);
        }
    };

    info!(peer_id = args.peer_id, bind = %args.bind, peers = ?args.peers, "starting session");

    let session = Arc::new(Session::new(config));

    let receiver_handle = {
        let socket = socket.try_clone().expect("socket clone for receiver thread");
        let session = Arc::clone(&session);
        std::thread::spawn(move || receiver::run(&socket, &session))
    };
    let sender_handle = {
        let socket = socket.try_clone().expect("socket clone for sender thread");
        let session = Arc::clone(&session);
        std::thread::spawn(move || sender::run(&socket, &session))
    };

    let mut local_frame = session.config().initial_frame;
    let mut ticks = 0u64;

    loop {
        if args.frame_limit != 0 && ticks >= args.frame_limit {
            break;
        }

        for peer in session.peer_ids() {
            if let Some(queue) = session.transmission_queue(peer) {
                queue
                    .enqueue_local(FrameInput::new(local_frame, Vec::new()))
                    .expect("local_frame is incremented in strict lockstep with next_frame_to_send");
            }
        }
        local_frame += 1;

        match session.tick() {
            Ok(frames) => {
                for (peer, frame) in &frames {
                    info!(%peer, frame_number = frame.frame_number(), "frame delivered");
                }
                ticks += 1;
            }
            Err(err) => {
                warn!(error = %err, "session tick failed, stopping");
                break;
            }
        }
    }

    session.request_stop();
    let _ = receiver_handle.join();
    let _ = sender_handle.join();
    info!(ticks, "session stopped");
}
