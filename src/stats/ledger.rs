//! Submitted-share bookkeeping.
//!
//! The ledger is owned by the session task and only mutated there. It keeps
//! the pending-request table for `mining.submit`, lifetime counters, and a
//! rolling window of outcomes used to flag a sustained rejection rate.

use crate::miner::scheduler::Share;
use crate::types::ShareStatus;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Rejection-rate diagnostic settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Number of most recent outcomes considered
    #[serde(default = "default_window")]
    pub window: usize,

    /// Rejected fraction above which the diagnostic fires
    #[serde(default = "default_rejection_threshold")]
    pub rejection_threshold: f64,

    /// Outcomes required in the window before the rate is judged
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

fn default_window() -> usize {
    20
}

fn default_rejection_threshold() -> f64 {
    0.5
}

fn default_min_samples() -> usize {
    10
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            window: default_window(),
            rejection_threshold: default_rejection_threshold(),
            min_samples: default_min_samples(),
        }
    }
}

/// Lifetime share counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounters {
    pub sent: u64,
    pub accepted: u64,
    pub rejected: u64,
    /// Submitted but the connection dropped before the pool answered
    pub lost: u64,
    /// Found for a superseded job and never submitted
    pub stale: u64,
}

/// A share sent to the pool
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedShare {
    pub share: Share,
    pub submitted_at: Instant,
    pub status: ShareStatus,
}

/// Raised when the windowed rejection rate crosses the threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RejectionAlert {
    pub rate: f64,
    pub window: usize,
}

/// What resolving a submission produced
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub submitted: SubmittedShare,
    pub latency: Duration,
    pub alert: Option<RejectionAlert>,
}

#[derive(Debug)]
pub struct ShareLedger {
    config: LedgerConfig,
    counters: LedgerCounters,
    pending: HashMap<u64, SubmittedShare>,
    /// `true` for each rejection, newest at the back
    outcomes: VecDeque<bool>,
    alerting: bool,
}

impl ShareLedger {
    pub fn new(config: LedgerConfig) -> Self {
        ShareLedger {
            outcomes: VecDeque::with_capacity(config.window),
            config,
            counters: LedgerCounters::default(),
            pending: HashMap::new(),
            alerting: false,
        }
    }

    pub fn counters(&self) -> LedgerCounters {
        self.counters
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    /// Stores a share as `Pending` under its request id.
    pub fn record_submitted(&mut self, id: u64, share: Share) {
        self.counters.sent += 1;
        self.pending.insert(
            id,
            SubmittedShare {
                share,
                submitted_at: Instant::now(),
                status: ShareStatus::Pending,
            },
        );
    }

    /// Counts a share that was discarded because its job went stale.
    pub fn record_stale(&mut self) {
        self.counters.stale += 1;
    }

    /// Finalizes the pending share with the pool's verdict.
    ///
    /// Returns `None` for an id that is not pending (duplicate or unknown
    /// response).
    pub fn resolve(&mut self, id: u64, status: ShareStatus) -> Option<Resolution> {
        let mut submitted = self.pending.remove(&id)?;
        let rejected = match &status {
            ShareStatus::Accepted => {
                self.counters.accepted += 1;
                false
            }
            ShareStatus::Rejected(_) => {
                self.counters.rejected += 1;
                true
            }
            ShareStatus::Pending => {
                self.pending.insert(id, submitted);
                return None;
            }
        };
        submitted.status = status;

        self.outcomes.push_back(rejected);
        while self.outcomes.len() > self.config.window.max(1) {
            self.outcomes.pop_front();
        }

        Some(Resolution {
            latency: submitted.submitted_at.elapsed(),
            submitted,
            alert: self.check_rate(),
        })
    }

    /// Forgets every pending share; each counts as lost.
    pub fn drop_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.counters.lost += dropped as u64;
        self.pending.clear();
        dropped
    }

    /// Rejected fraction over the window, once enough samples exist.
    pub fn rejection_rate(&self) -> Option<f64> {
        if self.outcomes.is_empty() || self.outcomes.len() < self.config.min_samples {
            return None;
        }
        let rejected = self.outcomes.iter().filter(|&&r| r).count();
        Some(rejected as f64 / self.outcomes.len() as f64)
    }

    /// Whether the diagnostic is currently raised.
    pub fn is_alerting(&self) -> bool {
        self.alerting
    }

    /// Fires once when the rate goes above the threshold; re-arms when it
    /// falls back.
    fn check_rate(&mut self) -> Option<RejectionAlert> {
        let rate = self.rejection_rate()?;
        let high = rate > self.config.rejection_threshold;

        if high && !self.alerting {
            self.alerting = true;
            return Some(RejectionAlert {
                rate,
                window: self.outcomes.len(),
            });
        }
        if !high {
            self.alerting = false;
        }
        None
    }
}
