// src/miner/scheduler.rs
//! Search scheduler implementation
//!
//! The session task publishes immutable [`Work`] snapshots; a dedicated
//! search thread drives a rayon pool of [`Worker`] lanes against the latest
//! snapshot in bounded batches. Between batches the thread compares each
//! lane's `job_version` with the shared counter and drops stale lanes, so a
//! superseded job is never hashed past the batch it was in. Shares finished
//! in that last batch still go to the session, which decides from
//! `job_version` whether they may be submitted.

use crate::miner::job::Job;
use crate::miner::target::Target;
use crate::miner::worker::{BatchResult, Worker};
use crate::utils::error::MinerError;
use arc_swap::ArcSwapOption;
use crossbeam_channel::Sender;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Everything a search lane needs, frozen at publication time
#[derive(Debug)]
pub struct Work {
    /// Job being mined
    pub job: Arc<Job>,
    /// Session-assigned counter, bumped on every job replacement
    pub job_version: u64,
    /// Share target derived from the pool difficulty
    pub target: Target,
    /// Pool-assigned extranonce1
    pub extranonce1: Vec<u8>,
    /// Width of the miner-chosen extranonce2 in bytes
    pub extranonce2_size: usize,
}

impl Work {
    pub fn new(
        job: Arc<Job>,
        job_version: u64,
        target: Target,
        extranonce1: Vec<u8>,
        extranonce2_size: usize,
    ) -> Self {
        Work {
            job,
            job_version,
            target,
            extranonce1,
            extranonce2_size,
        }
    }

    /// Encodes counter value `n` as a big-endian extranonce2.
    ///
    /// Returns `None` once `n` no longer fits in `extranonce2_size` bytes.
    pub fn extranonce2_for(&self, n: u64) -> Option<Vec<u8>> {
        let size = self.extranonce2_size;
        if size < 8 && n >= 1u64 << (8 * size) {
            return None;
        }

        let mut bytes = vec![0u8; size];
        let be = n.to_be_bytes();
        let take = size.min(8);
        bytes[size - take..].copy_from_slice(&be[8 - take..]);
        Some(bytes)
    }

    /// Whether two snapshots only differ in target.
    fn same_search_space(&self, other: &Work) -> bool {
        self.job_version == other.job_version
            && self.extranonce1 == other.extranonce1
            && self.extranonce2_size == other.extranonce2_size
    }
}

/// A solution found by a search lane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    /// Version of the job snapshot that produced the share
    pub job_version: u64,
    /// Pool job id
    pub job_id: String,
    /// Lowercase hex extranonce2
    pub extranonce2: String,
    /// `nTime` as received with the job
    pub ntime: String,
    /// Winning nonce
    pub nonce: u32,
    /// SHA-256d of the winning header
    pub hash: [u8; 32],
}

impl Share {
    /// Nonce as submitted: 8 lowercase hex digits, big-endian.
    pub fn nonce_hex(&self) -> String {
        format!("{:08x}", self.nonce)
    }
}

/// Coordinates search lanes across the rayon pool
pub struct Scheduler {
    /// Current snapshot (atomically swappable)
    work: Arc<ArcSwapOption<Work>>,
    /// Version of the newest job; the lanes' cancellation signal
    job_version: Arc<AtomicU64>,
    /// Next extranonce2 to hand out for the current job
    extranonce2_counter: Arc<AtomicU64>,
    /// Channel for sending found shares to the session task
    share_sender: UnboundedSender<Share>,
    /// Optional channel for per-batch hash counts
    hash_sender: Option<Sender<u64>>,
    /// Flag to control the search thread
    active: Arc<AtomicBool>,
    /// Nonces each lane hashes before checking for a newer job
    batch_size: u32,
}

impl Scheduler {
    /// Creates a new Scheduler instance
    ///
    /// # Arguments
    /// * `share_sender` - Channel for sending found shares
    /// * `batch_size` - Nonces per lane between cancellation checks
    pub fn new(share_sender: UnboundedSender<Share>, batch_size: u32) -> Self {
        Scheduler {
            work: Arc::new(ArcSwapOption::empty()),
            job_version: Arc::new(AtomicU64::new(0)),
            extranonce2_counter: Arc::new(AtomicU64::new(0)),
            share_sender,
            hash_sender: None,
            active: Arc::new(AtomicBool::new(true)),
            batch_size: batch_size.max(1),
        }
    }

    /// Reports hash counts to the stats reporter.
    pub fn with_hash_reporting(mut self, hash_sender: Sender<u64>) -> Self {
        self.hash_sender = Some(hash_sender);
        self
    }

    /// Publishes a new snapshot
    ///
    /// The snapshot is stored before the version so a lane that observes the
    /// new version always finds the matching work.
    pub fn publish(&self, work: Work) {
        let version = work.job_version;
        if version != self.job_version.load(Ordering::SeqCst) {
            self.extranonce2_counter.store(0, Ordering::SeqCst);
        }
        self.work.store(Some(Arc::new(work)));
        self.job_version.store(version, Ordering::SeqCst);
    }

    /// Withdraws the current snapshot; lanes stop at their next batch boundary.
    pub fn clear(&self) {
        self.work.store(None);
    }

    /// Latest published snapshot
    pub fn current_work(&self) -> Option<Arc<Work>> {
        self.work.load_full()
    }

    /// Version of the newest job
    pub fn current_version(&self) -> u64 {
        self.job_version.load(Ordering::SeqCst)
    }

    /// Starts the search thread with `threads` rayon lanes
    ///
    /// The thread never touches the network; shares leave through the
    /// channel given to [`Scheduler::new`].
    pub fn start_mining(&self, threads: usize) -> Result<JoinHandle<()>, MinerError> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("hasher-{}", i))
            .build()
            .map_err(|e| MinerError::TaskError(format!("Failed to build hasher pool: {}", e)))?;

        let search = SearchLoop {
            work: self.work.clone(),
            job_version: self.job_version.clone(),
            extranonce2_counter: self.extranonce2_counter.clone(),
            share_sender: self.share_sender.clone(),
            hash_sender: self.hash_sender.clone(),
            active: self.active.clone(),
            batch_size: self.batch_size,
            threads,
        };

        std::thread::Builder::new()
            .name("search".into())
            .spawn(move || pool.install(|| search.run()))
            .map_err(MinerError::from)
    }

    /// Stops the search thread
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the search thread
struct SearchLoop {
    work: Arc<ArcSwapOption<Work>>,
    job_version: Arc<AtomicU64>,
    extranonce2_counter: Arc<AtomicU64>,
    share_sender: UnboundedSender<Share>,
    hash_sender: Option<Sender<u64>>,
    active: Arc<AtomicBool>,
    batch_size: u32,
    threads: usize,
}

impl SearchLoop {
    fn run(self) {
        let mut lanes: Vec<Worker> = Vec::with_capacity(self.threads);
        let mut current: Option<Arc<Work>> = None;
        let mut warned_exhausted = false;

        while self.active.load(Ordering::Relaxed) {
            let Some(latest) = self.work.load_full() else {
                lanes.clear();
                current = None;
                std::thread::sleep(Duration::from_millis(50));
                continue;
            };

            if !current.as_ref().is_some_and(|c| Arc::ptr_eq(c, &latest)) {
                match &current {
                    Some(previous) if previous.same_search_space(&latest) => {
                        log::debug!("Target changed, lanes keep their position");
                        for lane in lanes.iter_mut() {
                            lane.retarget(latest.clone());
                        }
                    }
                    Some(previous) => {
                        log::debug!(
                            "Job version {} superseded by {}, dropping {} lanes",
                            previous.job_version,
                            latest.job_version,
                            lanes.len()
                        );
                        lanes.clear();
                    }
                    None => {}
                }
                current = Some(latest.clone());
                warned_exhausted = false;
            }

            while lanes.len() < self.threads {
                let n = self.extranonce2_counter.fetch_add(1, Ordering::SeqCst);
                match latest.extranonce2_for(n) {
                    Some(extranonce2) => lanes.push(Worker::new(latest.clone(), extranonce2)),
                    None => break,
                }
            }

            if lanes.is_empty() {
                if !warned_exhausted {
                    log::warn!(
                        "Extranonce2 space exhausted for job {}, waiting for new work",
                        latest.job.job_id
                    );
                    warned_exhausted = true;
                }
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }

            let batch = self.batch_size;
            let results: Vec<BatchResult> =
                lanes.par_iter_mut().map(|lane| lane.search(batch)).collect();

            let hashes: u64 = results.iter().map(|r| r.hashes).sum();
            if let Some(sender) = &self.hash_sender {
                let _ = sender.send(hashes);
            }

            if !self.forward(results) {
                log::debug!("Session gone, stopping search thread");
                return;
            }

            // Cancellation point: a superseded job is not hashed any further.
            if self.job_version.load(Ordering::SeqCst) != latest.job_version
                || self.work.load().is_none()
            {
                log::debug!(
                    "Job version {} cancelled at batch boundary",
                    latest.job_version
                );
                lanes.clear();
                current = None;
                continue;
            }

            lanes.retain(|lane| !lane.is_exhausted());
            std::thread::yield_now();
        }

        log::debug!("Search thread stopped");
    }

    /// Hands every share of a finished batch to the session.
    ///
    /// Shares of a job superseded during the batch are included; the session
    /// submits them unless `clean_jobs` or a new extranonce made them stale.
    /// Returns `false` once the session has gone away.
    fn forward(&self, results: Vec<BatchResult>) -> bool {
        results
            .into_iter()
            .filter_map(|r| r.share)
            .all(|share| self.share_sender.send(share).is_ok())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use hex_literal::hex;

    /// Genesis block split as a Stratum job: extranonce1 `04ffff00`,
    /// 4-byte extranonce2, winning extranonce2 `1d010445`.
    pub(crate) fn genesis_job() -> Job {
        Job {
            job_id: "genesis".into(),
            prev_hash: [0u8; 32],
            coinbase_part1: hex::decode(GENESIS_COINB1).unwrap(),
            coinbase_part2: hex::decode(GENESIS_COINB2).unwrap(),
            merkle_branch: vec![],
            version: 1,
            nbits: 0x1d00ffff,
            ntime: 0x495fab29,
            ntime_hex: "495fab29".into(),
            clean_jobs: false,
        }
    }

    pub(crate) const GENESIS_COINB1: &str =
        "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d";

    pub(crate) const GENESIS_COINB2: &str = concat!(
        "5468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b",
        "206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a0100000043",
        "4104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4",
        "f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000"
    );

    pub(crate) fn genesis_work(difficulty: f64) -> Arc<Work> {
        Arc::new(Work::new(
            Arc::new(genesis_job()),
            1,
            Target::from_difficulty(difficulty).unwrap(),
            hex!("04ffff00").to_vec(),
            4,
        ))
    }
}
