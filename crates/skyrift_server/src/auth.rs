//! JWT verification for the EnterWorld handshake.
//!
//! The login service issues HS256 tokens over a secret shared with this
//! process. Verification is self-contained: base64url decoding, a
//! constant-time HMAC check, then claim validation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::id::AccountId;

type HmacSha256 = Hmac<Sha256>;

/// Clock skew tolerated on `iat`, seconds.
const IAT_LEEWAY_SECS: u64 = 300;

#[derive(Error, Copy, Clone, PartialEq, Eq, Debug)]
pub enum JwtError {
    #[error("malformed token")]
    Malformed,
    #[error("unsupported algorithm")]
    UnsupportedAlgorithm,
    #[error("signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub account_id: AccountId,
    /// Hex-encoded session token, matching the EnterWorld binding.
    pub session_id: String,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// Verifies tokens and returns their claims.
pub trait JwtVerifier: Send + Sync {
    fn verify(&self, jwt: &str, now_unix: u64) -> Result<Claims, JwtError>;
}

pub struct Hs256Verifier {
    secret: Vec<u8>,
}

impl Hs256Verifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl JwtVerifier for Hs256Verifier {
    fn verify(&self, jwt: &str, now_unix: u64) -> Result<Claims, JwtError> {
        let mut parts = jwt.split('.');
        let (header_b64, claims_b64, sig_b64) = match (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) {
            (Some(h), Some(c), Some(s), None) => (h, c, s),
            _ => return Err(JwtError::Malformed),
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| JwtError::Malformed)?;
        let header: Header =
            serde_json::from_slice(&header_bytes).map_err(|_| JwtError::Malformed)?;

        if header.alg != "HS256" {
            return Err(JwtError::UnsupportedAlgorithm);
        }

        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| JwtError::Malformed)?;

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&sig).map_err(|_| JwtError::BadSignature)?;

        let claims_bytes = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| JwtError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&claims_bytes).map_err(|_| JwtError::Malformed)?;

        if now_unix >= claims.exp {
            return Err(JwtError::Expired);
        }
        if claims.iat > now_unix + IAT_LEEWAY_SECS {
            return Err(JwtError::NotYetValid);
        }

        Ok(claims)
    }
}

/// Signs claims the way the login service does. Exists for tests and local
/// tooling; the world server itself only verifies.
pub fn sign_hs256(secret: &[u8], claims: &Claims) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("claims serialize"));

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{header}.{body}.{sig}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"shared-login-secret";

    fn claims() -> Claims {
        Claims {
            account_id: 42,
            session_id: "00aabbccddeeff11".to_owned(),
            iat: 1_000,
            exp: 2_000,
        }
    }

    #[test]
    fn valid_token_verifies() {
        let jwt = sign_hs256(SECRET, &claims());
        let verifier = Hs256Verifier::new(SECRET);

        let got = verifier.verify(&jwt, 1_500).unwrap();
        assert_eq!(got, claims());
    }

    #[test]
    fn wrong_secret_rejected() {
        let jwt = sign_hs256(SECRET, &claims());
        let verifier = Hs256Verifier::new(b"other-secret".as_slice());

        assert_eq!(verifier.verify(&jwt, 1_500).unwrap_err(), JwtError::BadSignature);
    }

    #[test]
    fn tampered_claims_rejected() {
        let jwt = sign_hs256(SECRET, &claims());
        let mut parts: Vec<&str> = jwt.split('.').collect();

        let mut other = claims();
        other.account_id = 43;
        let forged = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&other).unwrap());
        parts[1] = &forged;

        let verifier = Hs256Verifier::new(SECRET);
        let forged_jwt = parts.join(".");
        assert_eq!(
            verifier.verify(&forged_jwt, 1_500).unwrap_err(),
            JwtError::BadSignature
        );
    }

    #[test]
    fn expiry_is_enforced() {
        let jwt = sign_hs256(SECRET, &claims());
        let verifier = Hs256Verifier::new(SECRET);

        assert_eq!(verifier.verify(&jwt, 2_000).unwrap_err(), JwtError::Expired);
        assert_eq!(verifier.verify(&jwt, 3_000).unwrap_err(), JwtError::Expired);
    }

    #[test]
    fn garbage_is_malformed() {
        let verifier = Hs256Verifier::new(SECRET);

        assert_eq!(verifier.verify("", 0).unwrap_err(), JwtError::Malformed);
        assert_eq!(verifier.verify("a.b", 0).unwrap_err(), JwtError::Malformed);
        assert_eq!(
            verifier.verify("!!.!!.!!", 0).unwrap_err(),
            JwtError::Malformed
        );
    }
}
