//! Work unit received through `mining.notify`.

use crate::utils::error::MinerError;

/// A decoded `mining.notify` job.
///
/// Binary fields are decoded once at receipt; the hex strings that have to
/// be echoed back in `mining.submit` are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Pool-assigned id, only unique among the pool's live jobs
    pub job_id: String,
    /// Previous block hash as sent by the pool
    pub prev_hash: [u8; 32],
    /// Coinbase bytes before the extranonce slot
    pub coinbase_part1: Vec<u8>,
    /// Coinbase bytes after the extranonce slot
    pub coinbase_part2: Vec<u8>,
    /// Sibling hashes from the coinbase leaf up to the root
    pub merkle_branch: Vec<[u8; 32]>,
    pub version: u32,
    /// Compact network target
    pub nbits: u32,
    pub ntime: u32,
    /// `nTime` exactly as received, echoed in submissions
    pub ntime_hex: String,
    /// Whether shares for earlier jobs must be dropped
    pub clean_jobs: bool,
}

impl Job {
    /// Builds a job from the hex fields of a notify message.
    #[allow(clippy::too_many_arguments)]
    pub fn from_hex(
        job_id: &str,
        prev_hash: &str,
        coinbase_part1: &str,
        coinbase_part2: &str,
        merkle_branch: &[String],
        version: &str,
        nbits: &str,
        ntime: &str,
        clean_jobs: bool,
    ) -> Result<Self, MinerError> {
        let merkle_branch = merkle_branch
            .iter()
            .map(|node| decode_hash(node, "merkle branch"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Job {
            job_id: job_id.to_string(),
            prev_hash: decode_hash(prev_hash, "prevhash")?,
            coinbase_part1: hex::decode(coinbase_part1)?,
            coinbase_part2: hex::decode(coinbase_part2)?,
            merkle_branch,
            version: decode_word(version, "version")?,
            nbits: decode_word(nbits, "nbits")?,
            ntime: decode_word(ntime, "ntime")?,
            ntime_hex: ntime.to_lowercase(),
            clean_jobs,
        })
    }
}

fn decode_hash(value: &str, field: &str) -> Result<[u8; 32], MinerError> {
    let bytes = hex::decode(value)?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        MinerError::ProtocolError(format!("{} must be 32 bytes, got {}", field, bytes.len()))
    })
}

/// Parses an 8-digit big-endian hex word (`version`, `nbits`, `ntime`).
fn decode_word(value: &str, field: &str) -> Result<u32, MinerError> {
    if value.len() != 8 {
        return Err(MinerError::ProtocolError(format!(
            "{} must be 8 hex digits, got {:?}",
            field, value
        )));
    }
    u32::from_str_radix(value, 16)
        .map_err(|e| MinerError::ProtocolError(format!("invalid {} {:?}: {}", field, value, e)))
}
