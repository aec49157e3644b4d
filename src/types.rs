// src/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle of a pool session
///
/// ```text
/// Disconnected -> Connecting -> Subscribed -> Authorized -> Mining
///       ^                                                     |
///       +-------------------- Reconnecting <------------------+
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No socket, no session data
    Disconnected,

    /// TCP connected, `mining.subscribe` in flight
    Connecting,

    /// Extranonce1 known, `mining.authorize` in flight
    Subscribed,

    /// Worker accepted by the pool, no job received yet
    Authorized,

    /// Work published to the search lanes
    Mining,

    /// Waiting out the backoff delay before the next attempt
    Reconnecting,
}

impl SessionState {
    /// Whether found shares may be submitted in this state.
    pub fn can_submit(self) -> bool {
        matches!(self, SessionState::Authorized | SessionState::Mining)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Subscribed => write!(f, "subscribed"),
            SessionState::Authorized => write!(f, "authorized"),
            SessionState::Mining => write!(f, "mining"),
            SessionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Outcome of a submitted share
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShareStatus {
    /// Waiting for the pool's response
    Pending,

    Accepted,

    /// Rejected with the pool's reason
    Rejected(String),
}

impl fmt::Display for ShareStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareStatus::Pending => write!(f, "pending"),
            ShareStatus::Accepted => write!(f, "accepted"),
            ShareStatus::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_authorized_states_submit() {
        assert!(SessionState::Mining.can_submit());
        assert!(SessionState::Authorized.can_submit());
        assert!(!SessionState::Subscribed.can_submit());
        assert!(!SessionState::Reconnecting.can_submit());
    }

    #[test]
    fn display() {
        assert_eq!(SessionState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(
            ShareStatus::Rejected("Stale share".into()).to_string(),
            "rejected: Stale share"
        );
    }
}
