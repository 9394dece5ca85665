//! Per-tick outbound staging.
//!
//! Handlers write encoded frames into per-connection staging buffers during
//! the tick; after the last phase a single pass hands each touched
//! connection's bytes to its writer, so every socket is flushed at most
//! once per tick. Real-time UDP traffic bypasses the staging entirely.

use std::net::{IpAddr, SocketAddr};

use prost::Message;
use rustc_hash::FxHashMap;
use skyrift_protocol::messages::movement::PositionBroadcast;
use skyrift_protocol::messages::system::ErrorResponse;
use skyrift_protocol::{datagram, encode_payload, ErrorCode, FrameEncoder, Opcode};
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::entity::Player;
use crate::id::{AccountId, ConnId};
use crate::session::PlayerConnection;
use crate::validate::FixedWindow;

/// Authentication progress of one connection.
pub enum ConnAuth {
    Fresh,
    /// EnterWorld dispatched to the auth worker, reply pending.
    Pending,
    Authed(AccountId),
}

pub struct ConnSlot {
    pub handle: Box<dyn PlayerConnection>,
    pub ip: IpAddr,
    pub auth: ConnAuth,
    /// Malformed-frame budget; exceeding it terminates the session.
    pub malformed: FixedWindow,
}

/// The tick-owned table of live transport connections.
#[derive(Default)]
pub struct ConnectionTable {
    slots: FxHashMap<ConnId, ConnSlot>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, conn_id: ConnId, handle: Box<dyn PlayerConnection>, ip: IpAddr, config: &ServerConfig) {
        self.slots.insert(
            conn_id,
            ConnSlot {
                handle,
                ip,
                auth: ConnAuth::Fresh,
                malformed: FixedWindow::new(config.malformed_per_minute, 60_000),
            },
        );
    }

    pub fn get_mut(&mut self, conn_id: ConnId) -> Option<&mut ConnSlot> {
        self.slots.get_mut(&conn_id)
    }

    pub fn remove(&mut self, conn_id: ConnId) -> Option<ConnSlot> {
        self.slots.remove(&conn_id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn conn_ids(&self) -> Vec<ConnId> {
        self.slots.keys().copied().collect()
    }
}

/// Staging buffers for one tick's TCP traffic.
#[derive(Default)]
pub struct BroadcastStage {
    encoders: FxHashMap<ConnId, FrameEncoder>,
}

impl BroadcastStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `msg` into the staging buffer of one connection.
    pub fn stage<M: Message>(&mut self, conn_id: ConnId, opcode: Opcode, msg: &M) {
        let encoder = self.encoders.entry(conn_id).or_default();
        if let Err(e) = encoder.append_message(opcode, msg) {
            warn!(conn = conn_id, error = %e, "dropping oversized outbound frame");
        }
    }

    /// Stages the standard error envelope for a failed request.
    pub fn stage_error(&mut self, conn_id: ConnId, request_opcode: u16, code: ErrorCode) {
        self.stage(
            conn_id,
            Opcode::ErrorResponse,
            &ErrorResponse {
                opcode: u32::from(request_opcode),
                code: code.code(),
                message: code.tag().to_owned(),
            },
        );
    }

    /// Drops any staged bytes for a connection that went away.
    pub fn forget(&mut self, conn_id: ConnId) {
        self.encoders.remove(&conn_id);
    }

    /// Flushes one connection immediately, out of band. Used on the
    /// disconnect path so a final ErrorResponse still reaches the peer
    /// before the socket closes.
    pub fn flush_one(&mut self, conn_id: ConnId, slot: &mut ConnSlot) {
        if let Some(mut encoder) = self.encoders.remove(&conn_id) {
            if !encoder.is_empty() {
                let _ = slot.handle.try_send(encoder.take());
            }
        }
    }

    /// Flushes every touched connection exactly once. Returns the number of
    /// sockets written.
    pub fn finish_tick(&mut self, connections: &mut ConnectionTable) -> usize {
        let mut flushed = 0;

        for (&conn_id, encoder) in &mut self.encoders {
            if encoder.is_empty() {
                continue;
            }
            let bytes = encoder.take();

            let Some(slot) = connections.get_mut(conn_id) else {
                continue;
            };

            match slot.handle.try_send(bytes) {
                Ok(()) => flushed += 1,
                Err(e) => {
                    debug!(conn = conn_id, error = %e, "write failed, closing connection");
                    slot.handle.close();
                }
            }
        }

        flushed
    }
}

/// Seam for the post-MVP position delta compression. The identity policy
/// sends every update verbatim.
pub trait DeltaPolicy: Send {
    fn encode_position(&self, update: &PositionBroadcast) -> Vec<u8>;
}

pub struct IdentityDelta;

impl DeltaPolicy for IdentityDelta {
    fn encode_position(&self, update: &PositionBroadcast) -> Vec<u8> {
        encode_payload(update)
    }
}

/// Outbound real-time channel. The network layer backs this with the bound
/// UDP socket; tests record the traffic.
pub trait DatagramSink: Send + Sync {
    fn send_to(&self, addr: SocketAddr, bytes: Vec<u8>);
}

/// Discards everything; stands in before the socket is up.
pub struct NullSink;

impl DatagramSink for NullSink {
    fn send_to(&self, _addr: SocketAddr, _bytes: Vec<u8>) {}
}

/// Seals and sends one datagram to a player's learned UDP address. A player
/// that has not yet sent any datagram has no address and is skipped.
pub fn send_datagram<M: Message>(
    sink: &dyn DatagramSink,
    player: &mut Player,
    opcode: Opcode,
    msg: &M,
) {
    send_sealed(sink, player, opcode, encode_payload(msg));
}

/// Position broadcasts go through the delta-policy seam.
pub fn send_position(
    sink: &dyn DatagramSink,
    delta: &dyn DeltaPolicy,
    player: &mut Player,
    update: &PositionBroadcast,
) {
    send_sealed(
        sink,
        player,
        Opcode::PositionBroadcast,
        delta.encode_position(update),
    );
}

fn send_sealed(sink: &dyn DatagramSink, player: &mut Player, opcode: Opcode, payload: Vec<u8>) {
    let Some(udp) = player.udp.as_mut() else {
        return;
    };
    let Some(addr) = udp.addr else {
        return;
    };

    udp.out_seq = udp.out_seq.wrapping_add(1);

    match datagram::seal(
        udp.token,
        udp.out_seq,
        opcode.to_raw(),
        &payload,
        udp.session.secret(),
    ) {
        Ok(bytes) => sink.send_to(addr, bytes),
        Err(e) => debug!(error = %e, "dropping oversized outbound datagram"),
    }
}
