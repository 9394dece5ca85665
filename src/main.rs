//! The world-server binary: wiring only. Configuration, collaborator
//! construction, the network layer and the persistence workers live on a
//! tokio runtime; the game loop owns the main thread.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use skyrift_network::Network;
use skyrift_registry::GameDefs;
use skyrift_server::auth::Hs256Verifier;
use skyrift_server::persist::memory::{
    MemoryAccountProvider, MemoryCharacterProvider, MemorySessionStore, MemoryStateCache,
};
use skyrift_server::persist::{spawn_workers, Collaborators};
use skyrift_server::queue::{InputEvent, InputQueue};
use skyrift_server::session::{HeartbeatTracker, SessionSecretCache};
use skyrift_server::{GameLoop, GameState, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skyrift-server", about = "Skyrift authoritative world server")]
struct Args {
    /// Path to a TOML config file; defaults apply without one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the TCP listen address.
    #[arg(long)]
    addr: Option<std::net::SocketAddr>,

    /// Override the game-definition data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(addr) = args.addr {
        config.tcp_addr = addr;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    config.validate()?;

    let defs = Arc::new(
        GameDefs::load_dir(&config.data_dir)
            .with_context(|| format!("loading game definitions from {}", config.data_dir.display()))?,
    );
    info!(zones = defs.zones().count(), "game definitions loaded");

    let config = Arc::new(config);
    let queue = InputQueue::new(config.input_queue_cap);
    let secret_cache = SessionSecretCache::new();
    let heartbeats = HeartbeatTracker::new();

    // Stand-alone deployments run on the in-memory collaborators; a full
    // cluster injects implementations backed by the shared cache and the
    // database service here.
    let sessions = Arc::new(MemorySessionStore::new());
    let collab = Collaborators {
        accounts: Arc::new(MemoryAccountProvider::new()),
        characters: Arc::new(MemoryCharacterProvider::new()),
        sessions: sessions.clone(),
        cache: Arc::new(MemoryStateCache::new()),
        jwt: Arc::new(Hs256Verifier::new(config.jwt_secret.as_bytes())),
    };

    let runtime = tokio::runtime::Runtime::new()?;

    let (persist, udp_sink) = runtime.block_on(async {
        let persist = spawn_workers(collab, queue.sender(), &config);

        let network = Network::bind(
            config.clone(),
            queue.sender(),
            secret_cache.clone(),
            heartbeats.clone(),
            sessions,
        )
        .await?;
        let udp_sink = network.datagram_sink();
        network.spawn();

        anyhow::Ok((persist, udp_sink))
    })?;

    // Ctrl-C feeds the shutdown event; the loop force-flushes everyone and
    // returns.
    {
        let events = queue.sender();
        let handle = runtime.handle().clone();
        handle.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                events.push(InputEvent::Shutdown);
            }
        });
    }

    let state = GameState::new(
        (*config).clone(),
        defs,
        secret_cache,
        heartbeats,
        udp_sink,
        persist,
    );

    GameLoop::new(state, queue).run();
    Ok(())
}
