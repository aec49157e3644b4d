// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components related to building and searching work:
//! - SHA-256d hashing and difficulty-to-target conversion
//! - Coinbase, merkle root and block header assembly
//! - Job scheduling and search lanes

/// SHA-256d primitives
pub mod hash;

/// Stratum job decoding
pub mod job;

/// Coinbase and merkle root construction
pub mod merkle;

/// 80-byte block header assembly
pub mod header;

/// Exact difficulty-to-target conversion
pub mod target;

/// Search scheduler
///
/// Publishes versioned work snapshots and drives the search lanes on a
/// dedicated thread pool.
pub mod scheduler;

/// Search lane implementation
pub mod worker;

// Re-export main components for cleaner imports
pub use self::job::Job;
pub use self::scheduler::{Scheduler, Share, Work};
pub use self::target::Target;
pub use self::worker::Worker;
