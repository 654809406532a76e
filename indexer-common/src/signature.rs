//! # Signature
//!
//! Verification of the `X-Webhook-Signature` header sent along with every webhook event.
//! The producer signs the raw request body with HMAC-SHA256 using a shared secret and sends
//! the lowercase hex encoding of the code.
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute the lowercase hex HMAC-SHA256 of `payload` keyed with `secret`.
pub fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);

    hex::encode(mac.finalize().into_bytes())
}

/// Return true if `signature` is the lowercase hex HMAC-SHA256 of `payload` under `secret`.
///
/// An empty signature is rejected before any code is computed. The comparison itself runs in
/// constant time with respect to the computed code.
pub fn verify(payload: &[u8], signature: &str, secret: &str) -> bool {
    if signature.is_empty() {
        return false;
    }

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}
