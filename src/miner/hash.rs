//! SHA-256d primitives shared by the merkle, header and search code.

use sha2::{Digest, Sha256};

/// Bitcoin's double SHA256: SHA256(SHA256(data)).
///
/// Used for the coinbase txid, every merkle node and the block header hash.
#[inline]
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut result = [0u8; 32];
    result.copy_from_slice(&second);
    result
}

/// Reverse the byte order of a 32-byte array.
///
/// Bitcoin displays hashes in the opposite order to the one they are
/// computed and serialized in.
#[inline]
pub fn reverse_bytes(bytes: &[u8; 32]) -> [u8; 32] {
    let mut reversed = *bytes;
    reversed.reverse();
    reversed
}

/// Hex of a digest in display order (the form block explorers show).
pub fn to_display_hex(hash: &[u8; 32]) -> String {
    hex::encode(reverse_bytes(hash))
}
