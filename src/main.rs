use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use live_presence::channel::memory::LocalHub;
use live_presence::channel::ws::WsTransport;
use live_presence::config::{DEFAULT_BIND_ADDR, DEFAULT_PORT, PresenceConfig, RelayConfig};
use live_presence::cursor::Viewport;
use live_presence::frame::Section;
use live_presence::identity::{FileStorage, Identity, MemoryStorage, SessionStorage};
use live_presence::{LiveSession, relay};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },
    #[error("relay server failed: {0}")]
    Serve(std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "live-presence", about = "Live presence relay and headless peer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the websocket relay.
    Serve(ServeArgs),
    /// Join a relay as a synthetic visitor.
    Peer(PeerArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
    bind_addr: String,

    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[derive(Args, Debug)]
struct PeerArgs {
    #[arg(long, env = "PRESENCE_RELAY_URL", default_value = "ws://127.0.0.1:3000/ws")]
    url: String,

    #[arg(long, env = "PRESENCE_SESSION_FILE", help = "Persist identity here; in-memory if omitted")]
    session_file: Option<PathBuf>,

    #[arg(long, help = "Leave after this many seconds; runs until Ctrl-C if omitted")]
    duration_secs: Option<u64>,

    #[arg(long, default_value_t = 30)]
    move_every_ms: u64,

    #[arg(long, default_value_t = 4)]
    scroll_every_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("ignoring .env: {e}");
        }
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Peer(args) => {
            run_peer(args).await;
            Ok(())
        }
    }
}

async fn run_serve(args: ServeArgs) -> Result<(), CliError> {
    let config = RelayConfig { bind_addr: args.bind_addr, port: args.port };
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| CliError::Bind { addr: addr.clone(), source })?;

    relay::serve(listener, LocalHub::new()).await.map_err(CliError::Serve)
}

async fn run_peer(args: PeerArgs) {
    let storage: Box<dyn SessionStorage> = match args.session_file {
        Some(path) => Box::new(FileStorage::new(path)),
        None => Box::new(MemoryStorage::new()),
    };
    let identity = Identity::load(storage.as_ref());
    let config = PresenceConfig::from_env();
    info!(visitor_id = %identity.visitor_id, color = %identity.color, url = %args.url, topic = %config.topic, "peer: starting");

    let transport = Arc::new(WsTransport::new(args.url, config.subscribe_timeout));
    let mut session = LiveSession::mount(transport, identity, config);
    let mut status = session.presence();
    let mut cursors = session.cursors();
    let mut notices = session.notices();

    let viewport = Viewport::new(1280.0, 800.0);
    let mut mover = tokio::time::interval(Duration::from_millis(args.move_every_ms.max(1)));
    let mut scroller = tokio::time::interval(Duration::from_secs(args.scroll_every_secs.max(1)));
    scroller.tick().await;

    let deadline = async {
        match args.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut step: u32 = 0;
    let mut sections = Section::ALL.iter().copied().cycle().skip(1);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("peer: interrupted");
                break;
            }
            () = &mut deadline => break,
            _ = mover.tick() => {
                let (px, py) = pointer_path(step, viewport);
                session.pointer_move(px, py, viewport);
                step = step.wrapping_add(1);
            }
            _ = scroller.tick() => {
                if let Some(section) = sections.next() {
                    session.scroll(section);
                }
            }
            Ok(()) = status.changed() => {
                let current = *status.borrow_and_update();
                info!(count = current.count, connected = current.is_connected, "peer: presence");
            }
            Ok(()) = cursors.changed() => {
                let remote = cursors.borrow_and_update().len();
                debug!(remote, "peer: cursors");
            }
            Ok(()) = notices.changed() => {
                for notice in notices.borrow_and_update().iter() {
                    info!(visitor_id = %notice.visitor_id, "peer: visitor joined");
                }
            }
        }
    }

    session.teardown().await;
    info!("peer: done");
}

/// A slow figure-eight across the viewport.
fn pointer_path(step: u32, viewport: Viewport) -> (f64, f64) {
    let t = f64::from(step) * 0.05;
    let x = (0.5 + 0.4 * (t * 1.3).sin()) * viewport.width;
    let y = (0.5 + 0.4 * (t * 2.6).sin()) * viewport.height;
    (x, y)
}
