//! Connection binding and the shared real-time session state.
//!
//! Two structures here are the only domain-adjacent data touched by more
//! than one executor: [`SessionSecretCache`] (UDP worker + tick) and
//! [`HeartbeatTracker`] (tick + sweeper task). Both are internally locked;
//! everything else in the crate is owned by the tick alone.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use parking_lot::{Mutex, RwLock};
use rand::rngs::OsRng;
use rand::RngCore;
use rustc_hash::FxHashMap;
use skyrift_protocol::SessionToken;

use crate::id::{AccountId, ConnId};

/// Server-side handle to one client transport.
///
/// The real implementation hands bytes to a socket writer task; tests use
/// an in-memory mock. `try_send` must never block.
pub trait PlayerConnection: Send {
    fn try_send(&mut self, bytes: BytesMut) -> anyhow::Result<()>;

    /// Requests connection teardown. Idempotent.
    fn close(&mut self);

    fn remote_ip(&self) -> IpAddr;
}

/// Per-session state needed on the UDP hot path.
pub struct UdpSession {
    pub account_id: AccountId,
    pub conn_id: ConnId,
    secret: [u8; 32],
    /// Highest accepted inbound sequence. Only the UDP worker advances it.
    last_seq: AtomicU32,
}

impl UdpSession {
    pub fn new(account_id: AccountId, conn_id: ConnId, secret: [u8; 32]) -> Self {
        Self {
            account_id,
            conn_id,
            secret,
            last_seq: AtomicU32::new(0),
        }
    }

    pub fn secret(&self) -> &[u8; 32] {
        &self.secret
    }

    /// Accepts `seq` iff it is strictly greater than every previously
    /// accepted sequence, making replayed datagrams inert.
    pub fn accept_sequence(&self, seq: u32) -> bool {
        let last = self.last_seq.load(Ordering::Acquire);
        if seq <= last {
            return false;
        }
        self.last_seq.store(seq, Ordering::Release);
        true
    }
}

/// O(1) map from session token to HMAC secret and owner.
///
/// Populated at EnterWorld, dropped on disconnect. A lookup miss is handled
/// by the network layer (best-effort fallback to the shared session store);
/// the tick never waits on it.
#[derive(Clone, Default)]
pub struct SessionSecretCache {
    inner: Arc<RwLock<FxHashMap<SessionToken, Arc<UdpSession>>>>,
}

impl SessionSecretCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: SessionToken, session: Arc<UdpSession>) {
        self.inner.write().insert(token, session);
    }

    pub fn remove(&self, token: &SessionToken) {
        self.inner.write().remove(token);
    }

    pub fn get(&self, token: &SessionToken) -> Option<Arc<UdpSession>> {
        self.inner.read().get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Liveness bookkeeping for authenticated connections.
///
/// The tick stamps entries when heartbeat frames arrive; a sweeper task
/// collects the silent ones.
#[derive(Clone, Default)]
pub struct HeartbeatTracker {
    inner: Arc<Mutex<FxHashMap<ConnId, Instant>>>,
}

impl HeartbeatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a connection, counting from now.
    pub fn track(&self, conn_id: ConnId) {
        self.inner.lock().insert(conn_id, Instant::now());
    }

    pub fn beat(&self, conn_id: ConnId) {
        if let Some(at) = self.inner.lock().get_mut(&conn_id) {
            *at = Instant::now();
        }
    }

    pub fn forget(&self, conn_id: ConnId) {
        self.inner.lock().remove(&conn_id);
    }

    /// Removes and returns every connection silent for longer than
    /// `timeout`.
    pub fn collect_expired(&self, timeout: Duration) -> Vec<ConnId> {
        let now = Instant::now();
        let mut map = self.inner.lock();

        let expired: Vec<ConnId> = map
            .iter()
            .filter(|(_, &at)| now.duration_since(at) > timeout)
            .map(|(&id, _)| id)
            .collect();

        for id in &expired {
            map.remove(id);
        }
        expired
    }
}

/// Generates a fresh 8-byte session token from the OS RNG.
pub fn generate_token() -> SessionToken {
    let mut bytes = [0_u8; 8];
    OsRng.fill_bytes(&mut bytes);
    SessionToken::from_bytes(bytes)
}

/// Generates a fresh 32-byte HMAC secret from the OS RNG.
pub fn generate_secret() -> [u8; 32] {
    let mut bytes = [0_u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_form_a_strictly_increasing_suffix() {
        let session = UdpSession::new(1, 1, [0; 32]);

        assert!(session.accept_sequence(1));
        assert!(session.accept_sequence(2));
        assert!(!session.accept_sequence(2), "replay is dropped");
        assert!(!session.accept_sequence(1));
        assert!(session.accept_sequence(10), "gaps are fine");
        assert!(!session.accept_sequence(5));
    }

    #[test]
    fn zero_sequence_is_never_accepted() {
        let session = UdpSession::new(1, 1, [0; 32]);
        assert!(!session.accept_sequence(0));
    }

    #[test]
    fn cache_insert_lookup_remove() {
        let cache = SessionSecretCache::new();
        let token = generate_token();
        cache.insert(token, Arc::new(UdpSession::new(7, 3, generate_secret())));

        let hit = cache.get(&token).unwrap();
        assert_eq!(hit.account_id, 7);

        cache.remove(&token);
        assert!(cache.get(&token).is_none());
    }

    #[test]
    fn heartbeat_expiry() {
        let tracker = HeartbeatTracker::new();
        tracker.track(1);
        tracker.track(2);

        // Nothing is expired with a generous timeout.
        assert!(tracker.collect_expired(Duration::from_secs(60)).is_empty());

        // Everything is expired with a zero timeout.
        let mut expired = tracker.collect_expired(Duration::ZERO);
        expired.sort_unstable();
        assert_eq!(expired, vec![1, 2]);

        // Expired entries are gone.
        assert!(tracker.collect_expired(Duration::ZERO).is_empty());
    }
}
