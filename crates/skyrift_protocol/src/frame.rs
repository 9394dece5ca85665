use bytes::{Buf, BufMut, BytesMut};
use prost::Message;
use thiserror::Error;

use crate::{Opcode, FRAME_HEADER_LEN, MAX_FRAME_LEN};

/// Errors produced while framing or deframing the TCP stream.
///
/// Every variant is a protocol violation by the peer except
/// [`FrameError::MalformedPayload`], which is also reused by handlers when a
/// well-framed payload fails protobuf decoding.
#[derive(Error, Copy, Clone, PartialEq, Eq, Debug)]
pub enum FrameError {
    #[error("frame length {0} exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(usize),
    #[error("frame length {0} is too short to hold an opcode")]
    FrameTooShort(usize),
    #[error("malformed protobuf payload")]
    MalformedPayload,
}

/// One decoded inbound frame: a raw opcode and its payload bytes.
///
/// The opcode is left raw here; unknown values must still reach the session
/// layer so it can count the violation before closing.
#[derive(Clone, Debug)]
pub struct Frame {
    pub opcode: u16,
    pub body: BytesMut,
}

impl Frame {
    /// Attempts to decode the body as the protobuf message `M`.
    pub fn decode<M: Message + Default>(&self) -> Result<M, FrameError> {
        M::decode(&self.body[..]).map_err(|_| FrameError::MalformedPayload)
    }
}

/// Incremental decoder for the length-prefixed TCP stream.
///
/// Bytes are queued as they arrive; [`FrameDecoder::try_next_frame`] yields
/// complete frames without copying payload bytes out of the receive buffer.
#[derive(Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut r = &self.buf[..];
        let frame_len = r.get_u32() as usize;

        if frame_len > MAX_FRAME_LEN {
            return Err(FrameError::FrameTooLarge(frame_len));
        }
        if frame_len < 2 {
            return Err(FrameError::FrameTooShort(frame_len));
        }

        if r.len() < frame_len {
            // The body is still in flight.
            return Ok(None);
        }

        self.buf.advance(FRAME_HEADER_LEN);
        let mut body = self.buf.split_to(frame_len);
        let opcode = (&body[..]).get_u16();
        body.advance(2);

        Ok(Some(Frame { opcode, body }))
    }

    pub fn queue_bytes(&mut self, bytes: BytesMut) {
        self.buf.unsplit(bytes);
    }

    pub fn queue_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn take_capacity(&mut self) -> BytesMut {
        self.buf.split_off(self.buf.len())
    }

    pub fn reserve(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }
}

/// Encoder for outbound frames.
///
/// Frames accumulate in an internal buffer so a tick's worth of writes to
/// one peer can be taken and flushed with a single syscall.
#[derive(Default)]
pub struct FrameEncoder {
    buf: BytesMut,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pre-encoded payload under the given opcode.
    pub fn append_frame(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), FrameError> {
        let frame_len = payload.len() + 2;

        if frame_len > MAX_FRAME_LEN {
            return Err(FrameError::FrameTooLarge(frame_len));
        }

        self.buf.reserve(FRAME_HEADER_LEN + frame_len);
        self.buf.put_u32(frame_len as u32);
        self.buf.put_u16(opcode.to_raw());
        self.buf.put_slice(payload);

        Ok(())
    }

    /// Encodes a protobuf message and appends it under the given opcode.
    pub fn append_message<M: Message>(&mut self, opcode: Opcode, msg: &M) -> Result<(), FrameError> {
        let payload_len = msg.encoded_len();
        let frame_len = payload_len + 2;

        if frame_len > MAX_FRAME_LEN {
            return Err(FrameError::FrameTooLarge(frame_len));
        }

        self.buf.reserve(FRAME_HEADER_LEN + frame_len);
        self.buf.put_u32(frame_len as u32);
        self.buf.put_u16(opcode.to_raw());

        msg.encode(&mut self.buf)
            .expect("reserved buffer cannot run out of space");

        Ok(())
    }

    /// Takes everything encoded so far, leaving the encoder empty.
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(opcode: Opcode, payload: &[u8]) -> Frame {
        let mut enc = FrameEncoder::new();
        enc.append_frame(opcode, payload).unwrap();

        let mut dec = FrameDecoder::new();
        dec.queue_bytes(enc.take());

        let frame = dec.try_next_frame().unwrap().expect("complete frame");
        assert!(dec.try_next_frame().unwrap().is_none(), "no trailing frame");
        frame
    }

    #[test]
    fn encode_decode_round_trip() {
        let max_body = vec![0_u8; MAX_FRAME_LEN - 2];

        for payload in [&b""[..], &b"x"[..], &[0xAB; 512][..], &max_body[..]] {
            let frame = round_trip(Opcode::ChatSend, payload);
            assert_eq!(frame.opcode, Opcode::ChatSend.to_raw());
            assert_eq!(&frame.body[..], payload);
        }
    }

    #[test]
    fn partial_input_yields_nothing() {
        let mut enc = FrameEncoder::new();
        enc.append_frame(Opcode::Heartbeat, &[1, 2, 3, 4]).unwrap();
        let bytes = enc.take();

        let mut dec = FrameDecoder::new();

        for (i, byte) in bytes.iter().enumerate() {
            dec.queue_slice(&[*byte]);
            let got = dec.try_next_frame().unwrap();

            if i + 1 < bytes.len() {
                assert!(got.is_none(), "frame completed early at byte {i}");
            } else {
                assert_eq!(&got.unwrap().body[..], &[1, 2, 3, 4]);
            }
        }
    }

    #[test]
    fn multiple_frames_in_one_buffer() {
        let mut enc = FrameEncoder::new();
        enc.append_frame(Opcode::Heartbeat, b"a").unwrap();
        enc.append_frame(Opcode::ChatSend, b"bb").unwrap();

        let mut dec = FrameDecoder::new();
        dec.queue_bytes(enc.take());

        assert_eq!(&dec.try_next_frame().unwrap().unwrap().body[..], b"a");
        assert_eq!(&dec.try_next_frame().unwrap().unwrap().body[..], b"bb");
        assert!(dec.try_next_frame().unwrap().is_none());
    }

    #[test]
    fn oversized_length_rejected() {
        let mut dec = FrameDecoder::new();
        dec.queue_slice(&(MAX_FRAME_LEN as u32 + 1).to_be_bytes());
        dec.queue_slice(&[0; 8]);

        assert_eq!(
            dec.try_next_frame().unwrap_err(),
            FrameError::FrameTooLarge(MAX_FRAME_LEN + 1)
        );
    }

    #[test]
    fn encoder_rejects_oversized_payload() {
        let mut enc = FrameEncoder::new();
        let too_big = vec![0_u8; MAX_FRAME_LEN - 1];

        assert!(enc.append_frame(Opcode::ChatSend, &too_big).is_err());
        assert!(enc.is_empty());
    }

    #[test]
    fn length_too_short_for_opcode_rejected() {
        let mut dec = FrameDecoder::new();
        dec.queue_slice(&1_u32.to_be_bytes());
        dec.queue_slice(&[0xFF]);

        assert_eq!(dec.try_next_frame().unwrap_err(), FrameError::FrameTooShort(1));
    }
}
