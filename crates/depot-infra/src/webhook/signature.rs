//! Webhook request signing
//!
//! Header format: `v1=<hex(HMAC-SHA256(secret, "{t}." || payload))>,t=<unix seconds>`

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const WEBHOOK_ID_HEADER: &str = "X-Webhook-ID";
pub const USER_AGENT: &str = "depot-webhook/1.0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid signing secret")]
    InvalidSecret,

    #[error("Malformed signature header: {0}")]
    MalformedHeader(String),

    #[error("Signature timestamp outside tolerance")]
    TimestampOutsideTolerance,

    #[error("Signature mismatch")]
    Mismatch,
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Build the signature header value for `payload` sent at `timestamp`
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
    let mac = mac_for(secret, timestamp, payload)?;
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("v1={},t={}", signature, timestamp))
}

/// Verify a signature header against `payload`.
///
/// The timestamp must be within `tolerance` of `now`; the digest comparison
/// is constant-time.
pub fn verify_signature(
    secret: &str,
    header: &str,
    payload: &[u8],
    now: i64,
    tolerance: Duration,
) -> Result<(), SignatureError> {
    let mut signature = None;
    let mut timestamp = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("v1", value)) => signature = Some(value),
            Some(("t", value)) => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader(header.to_string()))?,
                )
            }
            _ => {}
        }
    }

    let (signature, timestamp) = match (signature, timestamp) {
        (Some(s), Some(t)) => (s, t),
        _ => return Err(SignatureError::MalformedHeader(header.to_string())),
    };

    if now.abs_diff(timestamp) > tolerance.as_secs() {
        return Err(SignatureError::TimestampOutsideTolerance);
    }

    let provided =
        hex::decode(signature).map_err(|_| SignatureError::MalformedHeader(header.to_string()))?;

    mac_for(secret, timestamp, payload)?
        .verify_slice(&provided)
        .map_err(|_| SignatureError::Mismatch)
}
