//! Statistics collection and reporting module
//!
//! This module provides functionality for tracking and reporting mining statistics,
//! including:
//! - Hashrate calculations
//! - Share acceptance/rejection tracking and the rejection-rate diagnostic
//! - Hardware monitoring (CPU, memory, temperature)
//!
//! [`ShareLedger`] is the session's authoritative record of submitted shares.
//! [`StatsReporter`] aggregates telemetry from the search thread and the
//! session and periodically logs it.

/// Submitted-share ledger
///
/// Owned by the session task; tracks pending submissions by request id and
/// the rolling rejection rate.
pub mod ledger;

/// Submodule containing the statistics reporter implementation
///
/// The reporter handles:
/// - Atomic collection of mining statistics
/// - Hardware monitoring
/// - Periodic reporting of stats
/// - Thread-safe communication channels for receiving data
pub mod reporter;

// Re-export main components
pub use ledger::{LedgerConfig, LedgerCounters, RejectionAlert, ShareLedger};
pub use reporter::{HardwareStats, MiningStats, ShareResult, StatsReporter};
