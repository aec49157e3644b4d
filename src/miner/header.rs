//! Canonical 80-byte block header assembly.
//!
//! Layout (all integers little-endian):
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 4 | version |
//! | 4 | 32 | previous block hash, byte-reversed from the pool's hex |
//! | 36 | 32 | merkle root, internal byte order |
//! | 68 | 4 | nTime |
//! | 72 | 4 | nBits |
//! | 76 | 4 | nonce |

use crate::miner::hash::{double_sha256, reverse_bytes};
use crate::miner::job::Job;

pub const HEADER_LEN: usize = 80;

/// Offset of the nonce; everything before it is fixed for a given
/// (job, extranonce2) pair.
pub const NONCE_OFFSET: usize = 76;

/// Header fields that stay fixed while the nonce is scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderTemplate {
    prefix: [u8; NONCE_OFFSET],
}

impl HeaderTemplate {
    pub fn new(job: &Job, merkle_root: &[u8; 32]) -> Self {
        let mut prefix = [0u8; NONCE_OFFSET];
        prefix[0..4].copy_from_slice(&job.version.to_le_bytes());
        prefix[4..36].copy_from_slice(&reverse_bytes(&job.prev_hash));
        prefix[36..68].copy_from_slice(merkle_root);
        prefix[68..72].copy_from_slice(&job.ntime.to_le_bytes());
        prefix[72..76].copy_from_slice(&job.nbits.to_le_bytes());
        HeaderTemplate { prefix }
    }

    /// Full header with the given nonce.
    pub fn with_nonce(&self, nonce: u32) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[..NONCE_OFFSET].copy_from_slice(&self.prefix);
        header[NONCE_OFFSET..].copy_from_slice(&nonce.to_le_bytes());
        header
    }

    /// SHA-256d of the header with the given nonce.
    pub fn hash(&self, nonce: u32) -> [u8; 32] {
        double_sha256(&self.with_nonce(nonce))
    }
}
