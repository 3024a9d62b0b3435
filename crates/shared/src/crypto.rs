//! Content digests and encoding for command payloads.

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

/// Computes SHA-256 of the input bytes and returns it as a hex string.
pub fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Encodes file content for embedding in a JSON command value.
pub fn encode_content(input: &[u8]) -> String {
    STANDARD.encode(input)
}

/// Decodes content previously produced by [`encode_content`].
pub fn decode_content(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}
