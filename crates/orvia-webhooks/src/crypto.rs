//! HMAC-SHA256 payload signing.
//!
//! The signature covers the exact serialized body bytes that go on the
//! wire; receivers recompute the HMAC over the raw request body and compare
//! in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded HMAC-SHA256 signature of a payload body.
#[must_use]
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");

    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded signature against a payload body.
///
/// Comparison runs in constant time.
#[must_use]
pub fn verify_signature(expected_hex: &str, secret: &str, body: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    let computed = compute_signature(secret, body);
    expected_hex.as_bytes().ct_eq(computed.as_bytes()).into()
}
