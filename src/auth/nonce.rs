//! CSRF state tokens for browser flows.

use rand::rngs::OsRng;
use rand::RngCore;

/// Bytes of randomness in every nonce (128 bits)
pub const NONCE_BYTES: usize = 16;

/// Generate an unguessable, hex-encoded state token
pub fn generate_nonce() -> String {
    let mut random = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut random);
    hex::encode(random)
}
