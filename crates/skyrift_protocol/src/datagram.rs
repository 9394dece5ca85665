use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Byte offsets inside the fixed datagram layout:
/// `[token:8][sequence:4][opcode:2][payload:N][hmac:32]`.
const TOKEN_LEN: usize = 8;
const SEQ_OFFSET: usize = 8;
const OPCODE_OFFSET: usize = 12;
const PAYLOAD_OFFSET: usize = 14;
const MAC_LEN: usize = 32;

/// Smallest valid datagram: empty payload, full header and MAC.
pub const DATAGRAM_MIN_LEN: usize = PAYLOAD_OFFSET + MAC_LEN;

/// Hard ceiling; anything larger is dropped before parsing.
pub const DATAGRAM_MAX_LEN: usize = 512;

/// The 8-byte real-time session token issued at EnterWorld.
///
/// Tokens are opaque identifiers, not secrets; authenticity comes from the
/// per-session HMAC key. Displayed as hex in logs.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SessionToken([u8; TOKEN_LEN]);

impl SessionToken {
    pub const fn from_bytes(bytes: [u8; TOKEN_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[derive(Error, Copy, Clone, PartialEq, Eq, Debug)]
pub enum DatagramError {
    #[error("datagram of {0} bytes is outside the {DATAGRAM_MIN_LEN}..={DATAGRAM_MAX_LEN} range")]
    SizeOutOfRange(usize),
    #[error("datagram MAC verification failed")]
    BadMac,
}

/// A parsed view over one inbound datagram.
///
/// Parsing only splits the fixed layout; the MAC is *not* checked until
/// [`Datagram::verify_mac`] is called with the session's secret, because the
/// secret lookup requires the token parsed here.
#[derive(Copy, Clone, Debug)]
pub struct Datagram<'a> {
    pub token: SessionToken,
    pub sequence: u32,
    pub opcode: u16,
    pub payload: &'a [u8],
    /// Everything the MAC covers: the datagram minus its trailing MAC.
    signed: &'a [u8],
    mac: &'a [u8],
}

impl<'a> Datagram<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, DatagramError> {
        if buf.len() < DATAGRAM_MIN_LEN || buf.len() > DATAGRAM_MAX_LEN {
            return Err(DatagramError::SizeOutOfRange(buf.len()));
        }

        let (signed, mac) = buf.split_at(buf.len() - MAC_LEN);

        let mut token = [0_u8; TOKEN_LEN];
        token.copy_from_slice(&signed[..TOKEN_LEN]);

        Ok(Self {
            token: SessionToken::from_bytes(token),
            sequence: BigEndian::read_u32(&signed[SEQ_OFFSET..OPCODE_OFFSET]),
            opcode: BigEndian::read_u16(&signed[OPCODE_OFFSET..PAYLOAD_OFFSET]),
            payload: &signed[PAYLOAD_OFFSET..],
            signed,
            mac,
        })
    }

    /// Verifies the trailing MAC against the session secret in constant
    /// time.
    pub fn verify_mac(&self, secret: &[u8]) -> Result<(), DatagramError> {
        let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(self.signed);
        mac.verify_slice(self.mac).map_err(|_| DatagramError::BadMac)
    }
}

/// Seals an outbound datagram: header, payload, then the MAC over all of it.
pub fn seal(
    token: SessionToken,
    sequence: u32,
    opcode: u16,
    payload: &[u8],
    secret: &[u8],
) -> Result<Vec<u8>, DatagramError> {
    let total = PAYLOAD_OFFSET + payload.len() + MAC_LEN;

    if total > DATAGRAM_MAX_LEN {
        return Err(DatagramError::SizeOutOfRange(total));
    }

    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(token.as_bytes());
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(&opcode.to_be_bytes());
    buf.extend_from_slice(payload);

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(&buf);
    buf.extend_from_slice(&mac.finalize().into_bytes());

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = &[7_u8; 32];

    fn sample() -> Vec<u8> {
        seal(
            SessionToken::from_bytes(*b"tokn1234"),
            42,
            0x0101,
            &[1, 2, 3],
            SECRET,
        )
        .unwrap()
    }

    #[test]
    fn seal_parse_round_trip() {
        let wire = sample();
        let dgram = Datagram::parse(&wire).unwrap();

        assert_eq!(dgram.token, SessionToken::from_bytes(*b"tokn1234"));
        assert_eq!(dgram.sequence, 42);
        assert_eq!(dgram.opcode, 0x0101);
        assert_eq!(dgram.payload, &[1, 2, 3]);
        dgram.verify_mac(SECRET).unwrap();
    }

    #[test]
    fn any_flipped_byte_fails_verification() {
        let wire = sample();

        for i in 0..wire.len() - MAC_LEN {
            let mut tampered = wire.clone();
            tampered[i] ^= 0x01;

            let dgram = Datagram::parse(&tampered).unwrap();
            assert_eq!(
                dgram.verify_mac(SECRET).unwrap_err(),
                DatagramError::BadMac,
                "flipping byte {i} went undetected"
            );
        }
    }

    #[test]
    fn tampered_mac_fails_verification() {
        let mut wire = sample();
        let last = wire.len() - 1;
        wire[last] ^= 0x80;

        let dgram = Datagram::parse(&wire).unwrap();
        assert!(dgram.verify_mac(SECRET).is_err());
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let wire = sample();
        let dgram = Datagram::parse(&wire).unwrap();

        assert!(dgram.verify_mac(&[8_u8; 32]).is_err());
    }

    #[test]
    fn size_gates() {
        assert!(matches!(
            Datagram::parse(&[0_u8; DATAGRAM_MIN_LEN - 1]),
            Err(DatagramError::SizeOutOfRange(_))
        ));
        assert!(matches!(
            Datagram::parse(&[0_u8; DATAGRAM_MAX_LEN + 1]),
            Err(DatagramError::SizeOutOfRange(_))
        ));

        // A payload that would push the sealed size past the ceiling.
        let oversize = vec![0_u8; DATAGRAM_MAX_LEN];
        assert!(seal(
            SessionToken::from_bytes([0; 8]),
            0,
            0x0101,
            &oversize,
            SECRET
        )
        .is_err());
    }
}
