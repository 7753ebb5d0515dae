//! `X-Hub-Signature-256` verification.
//!
//! GitHub signs each delivery body with HMAC-SHA256 under the webhook secret
//! and sends `sha256=<hex>`. Deliveries are verified before anything parses
//! the body.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Parses `sha256=<hex>` into the raw signature bytes.
///
/// Returns `None` for any other algorithm or malformed hex.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.trim().strip_prefix("sha256=")?).ok()
}

/// The shared webhook secret.
#[derive(Clone)]
pub struct WebhookSecret(Vec<u8>);

impl WebhookSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        WebhookSecret(secret.into())
    }

    /// Checks a signature header against `payload` in constant time.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> bool {
        let Some(expected) = parse_signature_header(signature_header) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.0) else {
            return false;
        };
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }

    /// Produces the header GitHub would send for `payload`.
    #[cfg(test)]
    pub(crate) fn sign(&self, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.0).unwrap();
        mac.update(payload);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(..)")
    }
}
