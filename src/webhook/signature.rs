//! Webhook signature verification
//!
//! A pure function over (secret, raw body, provided signature): compute
//! HMAC-SHA256 over the exact bytes received, base64-encode the digest the
//! way the platform encodes its signature header, and compare in constant
//! time. Verification must see the raw body — parsing and re-serializing
//! can reorder keys or change whitespace and break the digest.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Verifies inbound webhook deliveries against the shared signing secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SignatureVerifier(***)")
    }
}

impl SignatureVerifier {
    /// Build a verifier around the platform's webhook signing secret.
    ///
    /// This is the webhook secret, not the OAuth client secret.
    pub fn new<S: AsRef<[u8]>>(secret: S) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Compute the base64-encoded HMAC-SHA256 signature for `body`.
    ///
    /// Used by tests and by any outbound signing this service does.
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(body);
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// Verify `provided` against the digest of `body`.
    ///
    /// `provided` is `None` when the signature header was absent. Rejects
    /// on a missing header, an empty body, or any mismatch; never panics
    /// on malformed input.
    pub fn verify(&self, body: &[u8], provided: Option<&str>) -> Result<(), SignatureError> {
        let provided = provided.ok_or(SignatureError::MissingHeader)?;
        if body.is_empty() {
            return Err(SignatureError::EmptyBody);
        }

        let expected = self.sign(body);
        if constant_time_eq(expected.as_bytes(), provided.trim().as_bytes()) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
