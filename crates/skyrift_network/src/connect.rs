//! The TCP accept loop and per-connection frame pump.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use skyrift_protocol::{FrameDecoder, Opcode};
use skyrift_server::queue::InputEvent;
use skyrift_server::session::PlayerConnection;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::SharedState;

const READ_BUF_SIZE: usize = 4096;

/// Writer-side frame budget: a slow client stalls itself, not the tick.
const OUTGOING_FRAME_BUDGET: usize = 1024;

/// Hands every inbound connection its own task, bounded by the global
/// connection cap.
pub(crate) async fn do_accept_loop(shared: SharedState, listener: TcpListener) {
    loop {
        // Claim a slot before touching the listener, so a full server
        // leaves excess clients queued in the kernel backlog instead of
        // half-accepted.
        let Ok(slot) = shared.0.connection_sema.clone().acquire_owned().await else {
            // The semaphore only closes when the server is going away.
            return;
        };

        match listener.accept().await {
            Ok((stream, remote_addr)) => {
                let shared = shared.clone();

                tokio::spawn(async move {
                    handle_connection(shared, stream, remote_addr).await;
                    drop(slot);
                });
            }
            Err(e) => warn!("accept failed: {e}"),
        }
    }
}

async fn handle_connection(shared: SharedState, stream: TcpStream, remote_addr: SocketAddr) {
    let ip = remote_addr.ip();

    // Per-IP cap; violations close the fresh connection immediately.
    {
        let mut per_ip = shared.0.per_ip.lock();
        let count = per_ip.entry(ip).or_insert(0);
        if *count >= shared.0.config.max_connections_per_ip {
            debug!(%ip, "per-IP connection cap hit, refusing");
            return;
        }
        *count += 1;
    }

    // Gameplay frames are tiny and latency-bound; never let Nagle batch
    // them.
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%ip, "could not disable nagling: {e}");
    }

    run_connection(&shared, stream, ip).await;

    let mut per_ip = shared.0.per_ip.lock();
    if let Some(count) = per_ip.get_mut(&ip) {
        *count -= 1;
        if *count == 0 {
            per_ip.remove(&ip);
        }
    }
}

async fn run_connection(shared: &SharedState, stream: TcpStream, ip: IpAddr) {
    let conn_id = shared.0.next_conn_id.fetch_add(1, Ordering::Relaxed);

    let (mut reader, mut writer) = stream.into_split();
    let (out_tx, out_rx) = flume::bounded::<BytesMut>(OUTGOING_FRAME_BUDGET);
    let closed = Arc::new(AtomicBool::new(false));

    let writer_task: JoinHandle<()> = tokio::spawn(async move {
        while let Ok(bytes) = out_rx.recv_async().await {
            if let Err(e) = writer.write_all(&bytes).await {
                debug!(conn = conn_id, "socket write failed: {e}");
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let handle = TcpPlayerConnection {
        out_tx,
        ip,
        closed: closed.clone(),
    };

    shared
        .0
        .events
        .push_blocking(InputEvent::Connected {
            conn_id,
            handle: Box::new(handle),
            ip,
        })
        .await;

    // Inbound pump. The idle timeout starts at the pre-auth value and
    // relaxes once an EnterWorld frame passes through.
    let mut dec = FrameDecoder::new();
    let mut idle = Duration::from_secs(shared.0.config.preauth_idle_sec);
    let enter_world = Opcode::EnterWorld.to_raw();

    'pump: loop {
        loop {
            match dec.try_next_frame() {
                Ok(Some(frame)) => {
                    if frame.opcode == enter_world {
                        idle = Duration::from_secs(shared.0.config.postauth_idle_sec);
                    }

                    shared
                        .0
                        .events
                        .push_blocking(InputEvent::Frame {
                            conn_id,
                            opcode: frame.opcode,
                            body: frame.body.freeze(),
                        })
                        .await;
                }
                Ok(None) => break,
                Err(e) => {
                    // Length violations are not survivable; the peer's
                    // framing is gone.
                    warn!(conn = conn_id, "frame decode error: {e}");
                    break 'pump;
                }
            }
        }

        if closed.load(Ordering::Acquire) {
            break;
        }

        dec.reserve(READ_BUF_SIZE);
        let mut buf = dec.take_capacity();

        match tokio::time::timeout(idle, reader.read_buf(&mut buf)).await {
            Ok(Ok(0)) => break, // EOF
            Ok(Ok(_)) => dec.queue_bytes(buf),
            Ok(Err(e)) => {
                debug!(conn = conn_id, "socket read failed: {e}");
                break;
            }
            Err(_) => {
                debug!(conn = conn_id, "idle timeout, closing");
                break;
            }
        }
    }

    writer_task.abort();
    shared.0.events.push(InputEvent::Disconnected { conn_id });
}

/// The tick-side handle to one TCP connection.
struct TcpPlayerConnection {
    out_tx: flume::Sender<BytesMut>,
    ip: IpAddr,
    closed: Arc<AtomicBool>,
}

impl PlayerConnection for TcpPlayerConnection {
    fn try_send(&mut self, bytes: BytesMut) -> anyhow::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            anyhow::bail!("connection closed");
        }

        match self.out_tx.try_send(bytes) {
            Ok(()) => Ok(()),
            Err(flume::TrySendError::Full(_)) => {
                anyhow::bail!("outgoing budget of {OUTGOING_FRAME_BUDGET} frames exhausted")
            }
            Err(flume::TrySendError::Disconnected(_)) => anyhow::bail!("writer gone"),
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
    }

    fn remote_ip(&self) -> IpAddr {
        self.ip
    }
}
