//! The UDP worker: the real-time channel's inbound gate pipeline and the
//! outbound sink.
//!
//! Gate order is fixed: size, per-IP rate, session lookup, HMAC, sequence.
//! Every rejection is a silent drop; the UDP surface never answers bad
//! traffic.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use rustc_hash::{FxHashMap, FxHashSet};
use skyrift_protocol::{Datagram, SessionToken, DATAGRAM_MAX_LEN};
use skyrift_server::queue::InputEvent;
use skyrift_server::session::UdpSession;
use skyrift_server::DatagramSink;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::SharedState;

pub(crate) async fn run_udp_worker(shared: SharedState, socket: Arc<UdpSocket>) {
    let mut buf = [0_u8; DATAGRAM_MAX_LEN + 1];
    let mut rate = IpRateLimiter::new(shared.0.config.udp_max_packets_per_ip_per_sec);

    // Tokens the session store did not know; re-querying them per packet
    // would let unknown traffic hammer the store.
    let mut unknown_tokens: FxHashSet<SessionToken> = FxHashSet::default();

    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                debug!("UDP recv error: {e}");
                continue;
            }
        };

        // 1. Size gate. `Datagram::parse` re-checks, but an oversized read
        // is detectable before parsing touches anything.
        let Ok(dgram) = Datagram::parse(&buf[..len]) else {
            continue;
        };

        // 2. Per-IP rate gate.
        if !rate.allow(addr.ip()) {
            continue;
        }

        // 3. Session lookup, with a one-shot fallback to the shared
        // session store for tokens this process has not seen.
        let session = match shared.0.secret_cache.get(&dgram.token) {
            Some(session) => session,
            None => {
                if unknown_tokens.contains(&dgram.token) {
                    continue;
                }
                match lookup_session(&shared, &dgram.token).await {
                    Some(session) => session,
                    None => {
                        // Bound the negative cache against token spray.
                        if unknown_tokens.len() >= 65_536 {
                            unknown_tokens.clear();
                        }
                        unknown_tokens.insert(dgram.token);
                        continue;
                    }
                }
            }
        };

        // 4. Authenticity.
        if dgram.verify_mac(session.secret()).is_err() {
            trace!(token = %dgram.token, "datagram failed MAC verification");
            continue;
        }

        // 5. Replay gate.
        if !session.accept_sequence(dgram.sequence) {
            continue;
        }

        // 6. Hand off to the tick.
        shared.0.events.push(InputEvent::Datagram {
            token: dgram.token,
            sequence: dgram.sequence,
            opcode: dgram.opcode,
            payload: Bytes::copy_from_slice(dgram.payload),
            addr,
        });
    }
}

async fn lookup_session(shared: &SharedState, token: &SessionToken) -> Option<Arc<UdpSession>> {
    let record = shared.0.sessions.get(token).await.ok()??;

    let session = Arc::new(UdpSession::new(record.account_id, 0, record.hmac_secret));
    shared.0.secret_cache.insert(*token, session.clone());
    Some(session)
}

/// Fixed one-second window per source IP.
struct IpRateLimiter {
    limit: u32,
    window_start: std::time::Instant,
    counts: FxHashMap<IpAddr, u32>,
}

impl IpRateLimiter {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            window_start: std::time::Instant::now(),
            counts: FxHashMap::default(),
        }
    }

    fn allow(&mut self, ip: IpAddr) -> bool {
        if self.window_start.elapsed().as_millis() >= 1000 {
            self.window_start = std::time::Instant::now();
            self.counts.clear();
        }

        let count = self.counts.entry(ip).or_insert(0);
        *count += 1;
        *count <= self.limit
    }
}

/// Outbound real-time sink over the bound socket. `try_send_to` never
/// blocks; a full socket buffer drops the datagram, which is the correct
/// fate for stale position traffic.
pub struct UdpSink {
    socket: Arc<UdpSocket>,
}

impl UdpSink {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

impl DatagramSink for UdpSink {
    fn send_to(&self, addr: SocketAddr, bytes: Vec<u8>) {
        if let Err(e) = self.socket.try_send_to(&bytes, addr) {
            trace!(%addr, "dropping outbound datagram: {e}");
        }
    }
}
