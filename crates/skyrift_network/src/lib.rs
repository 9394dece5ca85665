#![doc = include_str!("../README.md")]

mod connect;
mod udp;

use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use skyrift_server::config::ServerConfig;
use skyrift_server::persist::SessionStore;
use skyrift_server::queue::{InputEvent, InputSender};
use skyrift_server::session::{HeartbeatTracker, SessionSecretCache};
use skyrift_server::DatagramSink;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::Semaphore;
use tracing::info;

pub use udp::UdpSink;

/// State shared by every network task.
pub(crate) struct SharedStateInner {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) events: InputSender,
    pub(crate) secret_cache: SessionSecretCache,
    pub(crate) sessions: Arc<dyn SessionStore>,
    /// Closing this semaphore stops new connections.
    pub(crate) connection_sema: Arc<Semaphore>,
    /// Live connections per source IP.
    pub(crate) per_ip: Mutex<FxHashMap<std::net::IpAddr, usize>>,
    pub(crate) next_conn_id: AtomicU64,
}

#[derive(Clone)]
pub(crate) struct SharedState(pub(crate) Arc<SharedStateInner>);

/// The bound but not yet running network layer.
///
/// Binding and spawning are separate so callers (and tests) can learn the
/// actual addresses before traffic starts.
pub struct Network {
    shared: SharedState,
    heartbeats: HeartbeatTracker,
    tcp: TcpListener,
    udp: Arc<UdpSocket>,
}

impl Network {
    pub async fn bind(
        config: Arc<ServerConfig>,
        events: InputSender,
        secret_cache: SessionSecretCache,
        heartbeats: HeartbeatTracker,
        sessions: Arc<dyn SessionStore>,
    ) -> anyhow::Result<Self> {
        let tcp = TcpListener::bind(config.tcp_addr)
            .await
            .with_context(|| format!("binding TCP listener on {}", config.tcp_addr))?;
        let udp = UdpSocket::bind(config.udp_addr)
            .await
            .with_context(|| format!("binding UDP socket on {}", config.udp_addr))?;

        let shared = SharedState(Arc::new(SharedStateInner {
            connection_sema: Arc::new(Semaphore::new(
                config.max_connections_total.min(Semaphore::MAX_PERMITS),
            )),
            config,
            events,
            secret_cache,
            sessions,
            per_ip: Mutex::new(FxHashMap::default()),
            next_conn_id: AtomicU64::new(1),
        }));

        Ok(Self {
            shared,
            heartbeats,
            tcp,
            udp: Arc::new(udp),
        })
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp.local_addr().expect("listener is bound")
    }

    pub fn udp_addr(&self) -> SocketAddr {
        self.udp.local_addr().expect("socket is bound")
    }

    /// Outbound handle for the real-time channel.
    pub fn datagram_sink(&self) -> Arc<dyn DatagramSink> {
        Arc::new(UdpSink::new(self.udp.clone()))
    }

    /// Starts the accept loop, the UDP worker and the heartbeat sweeper on
    /// the current tokio runtime.
    pub fn spawn(self) {
        info!(
            tcp = %self.tcp_addr(),
            udp = %self.udp_addr(),
            "network layer up"
        );

        tokio::spawn(connect::do_accept_loop(self.shared.clone(), self.tcp));
        tokio::spawn(udp::run_udp_worker(self.shared.clone(), self.udp));
        tokio::spawn(heartbeat_sweep(
            self.shared.clone(),
            self.heartbeats,
        ));
    }
}

/// Periodic sweep closing connections whose heartbeat fell silent. The
/// tick runs the actual disconnect path when the event arrives.
async fn heartbeat_sweep(shared: SharedState, heartbeats: HeartbeatTracker) {
    const SWEEP_INTERVAL: Duration = Duration::from_secs(5);
    let timeout = Duration::from_secs(shared.0.config.heartbeat_timeout_sec);

    loop {
        tokio::time::sleep(SWEEP_INTERVAL).await;

        for conn_id in heartbeats.collect_expired(timeout) {
            tracing::debug!(conn = conn_id, "heartbeat silence, disconnecting");
            shared.0.events.push(InputEvent::Disconnected { conn_id });
        }
    }
}
