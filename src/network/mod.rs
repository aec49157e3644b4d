// src/network/mod.rs
//! Network communication components
//!
//! This module handles all interaction with a Stratum V1 mining pool:
//! - `codec` / `messages`: newline-delimited JSON framing and message types
//! - `session`: the sans-I/O session state machine
//! - `pool`: the tokio TCP client driving the state machine
//! - `backoff`: reconnect delay policy

/// Reconnect delay policy
pub mod backoff;

/// Line framing for Stratum JSON
pub mod codec;

/// Stratum V1 requests, responses and notifications
pub mod messages;

/// Mining pool client implementation
///
/// Owns the TCP connection, runs the handshake and submits shares.
/// Reconnects with bounded backoff when the connection drops.
pub mod pool;

/// Session state machine
pub mod session;

// Re-export main components for cleaner imports
pub use backoff::BackoffPolicy;
pub use codec::StratumCodec;
pub use pool::{ClientOptions, PoolClient, PoolConfig, PoolEndpoint};
pub use session::{SessionConfig, SessionEvent, SessionStateMachine};
