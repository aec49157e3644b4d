//! Stratum Miner - Stratum V1 SHA-256d pool miner in Rust
//!
//! This crate provides a complete Stratum V1 mining client with support for:
//! - The subscribe/authorize handshake and bounded reconnect
//! - Exact 256-bit difficulty-to-target conversion
//! - Coinbase, merkle root and block header assembly
//! - Parallel nonce search with job-version cancellation
//! - Share submission tracking and a rejection-rate diagnostic
//! - Performance benchmarking and hardware monitoring

#![forbid(unsafe_code)]

/// Miner core implementation including hashing, work assembly and scheduling
pub mod miner;

/// Network communication components for the pool connection
pub mod network;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use miner::{Job, Scheduler, Share, Target, Work, Worker};
pub use network::{PoolClient, PoolConfig, SessionStateMachine};
pub use stats::{HardwareStats, MiningStats, ShareLedger, StatsReporter};
pub use types::{SessionState, ShareStatus};
pub use utils::{MinerError, init_logging};
