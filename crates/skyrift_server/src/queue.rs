//! The input queue: the single crossing point from the I/O executors into
//! the tick.
//!
//! Multi-producer, single-consumer, FIFO. TCP producers use the blocking
//! path so frames are never dropped under backpressure; the UDP worker and
//! auxiliary producers use the watermark path, where overflow is dropped
//! and logged rather than allowed to grow without bound.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use skyrift_protocol::{ErrorCode, SessionToken};
use tracing::warn;

use crate::id::{AccountId, ConnId};
use crate::persist::CharacterRecord;
use crate::session::PlayerConnection;

/// Everything the tick consumes.
pub enum InputEvent {
    /// A new TCP connection completed the transport handshake.
    Connected {
        conn_id: ConnId,
        handle: Box<dyn PlayerConnection>,
        ip: IpAddr,
    },
    /// One framed TCP packet.
    Frame {
        conn_id: ConnId,
        opcode: u16,
        body: Bytes,
    },
    /// One authenticated, sequence-checked UDP datagram.
    Datagram {
        token: SessionToken,
        sequence: u32,
        opcode: u16,
        payload: Bytes,
        addr: SocketAddr,
    },
    /// The transport closed, or the heartbeat sweeper gave up on it.
    Disconnected { conn_id: ConnId },
    /// The auth/persistence worker finished resolving an EnterWorld.
    EnterWorldResolved {
        conn_id: ConnId,
        outcome: Result<Box<EnterWorldSuccess>, ErrorCode>,
    },
    /// A force-flush completed; the pending transfer may proceed.
    FlushDone { account_id: AccountId },
    /// Graceful shutdown: flush everyone and stop.
    Shutdown,
}

pub struct EnterWorldSuccess {
    pub account_id: AccountId,
    pub token: SessionToken,
    pub secret: [u8; 32],
    pub record: CharacterRecord,
}

/// Handle used by producers.
#[derive(Clone)]
pub struct InputSender {
    tx: flume::Sender<InputEvent>,
}

impl InputSender {
    /// Watermark path: drops and logs when the queue is at capacity.
    pub fn push(&self, event: InputEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(_)) => {
                warn!("input queue at watermark, dropping event");
            }
            Err(flume::TrySendError::Disconnected(_)) => {}
        }
    }

    /// Backpressure path: awaits queue space instead of dropping.
    pub async fn push_blocking(&self, event: InputEvent) {
        let _ = self.tx.send_async(event).await;
    }
}

pub struct InputQueue {
    tx: flume::Sender<InputEvent>,
    rx: flume::Receiver<InputEvent>,
}

impl InputQueue {
    pub fn new(cap: usize) -> Self {
        let (tx, rx) = flume::bounded(cap);
        Self { tx, rx }
    }

    pub fn sender(&self) -> InputSender {
        InputSender {
            tx: self.tx.clone(),
        }
    }

    pub fn receiver(&self) -> &flume::Receiver<InputEvent> {
        &self.rx
    }

    /// Drains everything currently queued, preserving FIFO order.
    pub fn drain(&self) -> Vec<InputEvent> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let queue = InputQueue::new(8);
        let sender = queue.sender();

        for conn_id in 0..5 {
            sender.push(InputEvent::Disconnected { conn_id });
        }

        let drained = queue.drain();
        assert_eq!(drained.len(), 5);
        for (i, event) in drained.iter().enumerate() {
            match event {
                InputEvent::Disconnected { conn_id } => assert_eq!(*conn_id, i as ConnId),
                _ => panic!("unexpected event"),
            }
        }
    }

    #[test]
    fn watermark_drops_instead_of_growing() {
        let queue = InputQueue::new(2);
        let sender = queue.sender();

        for conn_id in 0..10 {
            sender.push(InputEvent::Disconnected { conn_id });
        }

        assert_eq!(queue.drain().len(), 2, "overflow was dropped");
    }
}
