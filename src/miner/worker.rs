// src/miner/worker.rs
//! Search lane implementation
//!
//! A worker owns one extranonce2 value of the current work snapshot, builds
//! the coinbase and header for it once, then scans the 32-bit nonce space in
//! bounded batches.

use crate::miner::hash::double_sha256;
use crate::miner::header::{HEADER_LEN, HeaderTemplate, NONCE_OFFSET};
use crate::miner::merkle::{build_coinbase, merkle_root};
use crate::miner::scheduler::{Share, Work};
use crate::miner::target::Target;
use std::sync::Arc;

/// Whether a serialized header satisfies the target.
#[inline]
pub fn meets_target(header: &[u8; HEADER_LEN], target: &Target) -> bool {
    target.is_met_by(&double_sha256(header))
}

/// Outcome of one batch.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Share found in this batch, if any. The batch stops at the first hit.
    pub share: Option<Share>,
    /// Hashes computed in this batch
    pub hashes: u64,
}

/// A single search lane: one (snapshot, extranonce2) pair.
pub struct Worker {
    /// Snapshot this lane is hashing against
    work: Arc<Work>,
    /// Lowercase hex of `extranonce2`, as submitted
    extranonce2_hex: String,
    /// Header prefix for this extranonce2
    template: HeaderTemplate,
    /// Next nonce to try; passes `u32::MAX` once the space is spent
    next_nonce: u64,
}

impl Worker {
    /// Creates a lane for the given snapshot and extranonce2
    ///
    /// Builds the coinbase, folds the merkle branch and prepares the header
    /// prefix, so the hot loop only rewrites the nonce.
    pub fn new(work: Arc<Work>, extranonce2: Vec<u8>) -> Self {
        let template = Self::template_for(&work, &extranonce2);
        Worker {
            extranonce2_hex: hex::encode(&extranonce2),
            work,
            template,
            next_nonce: 0,
        }
    }

    /// Starts the scan at `nonce` instead of zero.
    pub fn starting_at(mut self, nonce: u32) -> Self {
        self.next_nonce = nonce as u64;
        self
    }

    fn template_for(work: &Work, extranonce2: &[u8]) -> HeaderTemplate {
        let coinbase = build_coinbase(
            &work.job.coinbase_part1,
            &work.extranonce1,
            extranonce2,
            &work.job.coinbase_part2,
        );
        let root = merkle_root(&coinbase, &work.job.merkle_branch);
        HeaderTemplate::new(&work.job, &root)
    }

    pub fn work(&self) -> &Arc<Work> {
        &self.work
    }

    pub fn job_version(&self) -> u64 {
        self.work.job_version
    }

    /// Swaps in a snapshot of the same job that only differs in target.
    ///
    /// The nonce position is kept so no range is hashed twice.
    pub fn retarget(&mut self, work: Arc<Work>) {
        debug_assert_eq!(work.job_version, self.work.job_version);
        self.work = work;
    }

    /// Whether the whole nonce space for this extranonce2 has been scanned.
    pub fn is_exhausted(&self) -> bool {
        self.next_nonce > u32::MAX as u64
    }

    /// Hashes up to `batch` nonces, stopping at the first share.
    pub fn search(&mut self, batch: u32) -> BatchResult {
        let mut header = self.template.with_nonce(0);
        let target = self.work.target;
        let end = (self.next_nonce + batch as u64).min(u32::MAX as u64 + 1);
        let mut result = BatchResult::default();

        while self.next_nonce < end {
            let nonce = self.next_nonce as u32;
            self.next_nonce += 1;
            result.hashes += 1;

            header[NONCE_OFFSET..].copy_from_slice(&nonce.to_le_bytes());
            let hash = double_sha256(&header);

            if target.is_met_by(&hash) {
                log::debug!(
                    "Share candidate job={} extranonce2={} nonce={:08x}",
                    self.work.job.job_id,
                    self.extranonce2_hex,
                    nonce
                );
                result.share = Some(Share {
                    job_version: self.work.job_version,
                    job_id: self.work.job.job_id.clone(),
                    extranonce2: self.extranonce2_hex.clone(),
                    ntime: self.work.job.ntime_hex.clone(),
                    nonce,
                    hash,
                });
                break;
            }
        }

        result
    }

    /// Header this lane would hash for `nonce`.
    pub fn header(&self, nonce: u32) -> [u8; HEADER_LEN] {
        self.template.with_nonce(nonce)
    }
}
