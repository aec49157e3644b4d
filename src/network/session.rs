// src/network/session.rs

//! Stratum session state machine
//!
//! All session transitions happen here and nowhere else. The machine does no
//! I/O: the pool client feeds it decoded messages and found shares, and writes
//! out whatever requests it returns. Job, target and extranonce changes are
//! turned into immutable [`Work`] snapshots and published to the scheduler.

use crate::miner::job::Job;
use crate::miner::scheduler::{Scheduler, Share, Work};
use crate::miner::target::Target;
use crate::network::messages::{
    AUTHORIZE_ID, Inbound, Message, PING_ID, Request, SUBMIT_ID_BASE, SUBSCRIBE_ID,
    SubscribeResult, error_reason,
};
use crate::stats::ledger::{LedgerConfig, LedgerCounters, RejectionAlert, ShareLedger};
use crate::stats::reporter::ShareResult;
use crate::types::{SessionState, ShareStatus};
use crate::utils::error::MinerError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Difficulty assumed until the pool sends `mining.set_difficulty`
pub const DEFAULT_DIFFICULTY: f64 = 1.0;

/// Identity the session presents to the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sent with `mining.subscribe`
    pub client_id: String,
    /// `"{username}.{worker_id}"`
    pub worker_identity: String,
    pub password: String,
}

/// Telemetry emitted on every observable transition
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    NewJob {
        job_id: String,
        job_version: u64,
        clean_jobs: bool,
    },
    DifficultyChanged(f64),
    ShareSubmitted {
        id: u64,
        job_id: String,
        nonce: u32,
    },
    ShareResolved {
        id: u64,
        status: ShareStatus,
        latency: Duration,
    },
    StaleShareDiscarded {
        job_version: u64,
    },
    RejectionRateHigh(RejectionAlert),
    SharesLost(usize),
}

impl SessionEvent {
    /// The share outcome this event reports to the stats reporter, if any.
    pub fn share_result(&self) -> Option<ShareResult> {
        match self {
            SessionEvent::ShareResolved {
                status: ShareStatus::Accepted,
                ..
            } => Some(ShareResult::Accepted),
            SessionEvent::ShareResolved {
                status: ShareStatus::Rejected(_),
                ..
            } => Some(ShareResult::Rejected),
            SessionEvent::StaleShareDiscarded { .. } => Some(ShareResult::Stale),
            SessionEvent::SharesLost(n) => Some(ShareResult::Lost(*n as u64)),
            _ => None,
        }
    }
}

/// Per-connection handshake data
#[derive(Debug, Clone)]
struct Session {
    subscription_id: String,
    extranonce1: Vec<u8>,
    extranonce2_size: usize,
    authorized: bool,
}

/// A job together with the version it was tagged with on receipt
#[derive(Debug, Clone)]
struct VersionedJob {
    job: Arc<Job>,
    version: u64,
}

pub struct SessionStateMachine {
    config: SessionConfig,
    state: SessionState,
    session: Option<Session>,
    current: Option<VersionedJob>,
    /// Superseded by a `clean_jobs = false` notify; still submittable
    previous: Option<VersionedJob>,
    difficulty: f64,
    target: Target,
    job_version: u64,
    /// Shares tagged below this version are stale
    min_submittable_version: u64,
    submissions: u64,
    ledger: ShareLedger,
    scheduler: Arc<Scheduler>,
    events: Option<UnboundedSender<SessionEvent>>,
}

impl SessionStateMachine {
    pub fn new(config: SessionConfig, ledger: LedgerConfig, scheduler: Arc<Scheduler>) -> Self {
        SessionStateMachine {
            config,
            state: SessionState::Disconnected,
            session: None,
            current: None,
            previous: None,
            difficulty: DEFAULT_DIFFICULTY,
            target: Target::from_integer_difficulty(1),
            job_version: 0,
            min_submittable_version: 0,
            submissions: 0,
            ledger: ShareLedger::new(ledger),
            scheduler,
            events: None,
        }
    }

    /// Forwards [`SessionEvent`]s to `events`.
    pub fn with_events(mut self, events: UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn counters(&self) -> LedgerCounters {
        self.ledger.counters()
    }

    pub fn ledger(&self) -> &ShareLedger {
        &self.ledger
    }

    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Version attached to the most recent job
    pub fn job_version(&self) -> u64 {
        self.job_version
    }

    pub fn current_job(&self) -> Option<&Arc<Job>> {
        self.current.as_ref().map(|c| &c.job)
    }

    pub fn extranonce1(&self) -> Option<&[u8]> {
        self.session.as_ref().map(|s| s.extranonce1.as_slice())
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.subscription_id.as_str())
    }

    pub fn is_authorized(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.authorized)
    }

    /// A fresh socket is open: start the handshake.
    pub fn on_connected(&mut self) -> Request {
        self.session = None;
        self.submissions = 0;
        self.set_state(SessionState::Connecting);
        Request::subscribe(&self.config.client_id)
    }

    /// The socket is gone; everything tied to it is discarded.
    pub fn on_disconnected(&mut self) {
        self.scheduler.clear();

        let lost = self.ledger.drop_pending();
        if lost > 0 {
            log::warn!("{} submitted shares lost with the connection", lost);
            self.emit(SessionEvent::SharesLost(lost));
        }

        // jobs are scoped to the connection; anything still in flight is stale
        self.session = None;
        self.current = None;
        self.previous = None;
        self.job_version += 1;
        self.min_submittable_version = self.job_version;
        self.difficulty = DEFAULT_DIFFICULTY;
        self.target = Target::from_integer_difficulty(1);

        self.set_state(SessionState::Disconnected);
    }

    /// Waiting out a backoff delay.
    pub fn on_reconnecting(&mut self) {
        self.set_state(SessionState::Reconnecting);
    }

    /// Applies one inbound message.
    ///
    /// # Returns
    /// Requests to write back to the pool, in order.
    ///
    /// # Errors
    /// A failed subscribe or authorize ends the connection attempt. Every
    /// other malformed or unexpected message is logged and dropped.
    pub fn handle_message(&mut self, message: Message) -> Result<Vec<Request>, MinerError> {
        match message {
            Message::Notification { method, params } => {
                self.handle_notification(&method, &params);
                Ok(Vec::new())
            }
            Message::Response { id, result, error } => self.handle_response(id, result, error),
        }
    }

    /// A search lane found a share.
    ///
    /// Returns the `mining.submit` request, or `None` when the share belongs
    /// to a job that may no longer be submitted.
    pub fn on_share_found(&mut self, share: Share) -> Option<Request> {
        if !self.state.can_submit() || !self.is_submittable(&share) {
            log::debug!(
                "Discarding stale share for job {} (version {}, current {})",
                share.job_id,
                share.job_version,
                self.job_version
            );
            self.ledger.record_stale();
            self.emit(SessionEvent::StaleShareDiscarded {
                job_version: share.job_version,
            });
            return None;
        }

        let id = SUBMIT_ID_BASE + self.submissions;
        self.submissions += 1;

        let request = Request::submit(id, &self.config.worker_identity, &share);
        log::info!(
            "Submitting share for job {}: nonce {} extranonce2 {}",
            share.job_id,
            share.nonce_hex(),
            share.extranonce2
        );
        self.emit(SessionEvent::ShareSubmitted {
            id,
            job_id: share.job_id.clone(),
            nonce: share.nonce,
        });
        self.ledger.record_submitted(id, share);
        Some(request)
    }

    fn is_submittable(&self, share: &Share) -> bool {
        if share.job_version < self.min_submittable_version {
            return false;
        }
        [&self.current, &self.previous]
            .into_iter()
            .flatten()
            .any(|v| v.version == share.job_version && v.job.job_id == share.job_id)
    }

    fn handle_response(
        &mut self,
        id: Option<u64>,
        result: Value,
        error: Value,
    ) -> Result<Vec<Request>, MinerError> {
        match id {
            Some(SUBSCRIBE_ID) => self.on_subscribe_response(&result, &error),
            Some(AUTHORIZE_ID) => {
                self.on_authorize_response(&result, &error)?;
                Ok(Vec::new())
            }
            Some(PING_ID) => {
                log::trace!("Ping answered");
                Ok(Vec::new())
            }
            Some(id) if id >= SUBMIT_ID_BASE => {
                self.on_submit_response(id, &result, &error);
                Ok(Vec::new())
            }
            other => {
                log::debug!("Ignoring response with unexpected id {:?}", other);
                Ok(Vec::new())
            }
        }
    }

    fn on_subscribe_response(
        &mut self,
        result: &Value,
        error: &Value,
    ) -> Result<Vec<Request>, MinerError> {
        if self.state != SessionState::Connecting {
            log::debug!("Ignoring subscribe response in state {}", self.state);
            return Ok(Vec::new());
        }
        if !error.is_null() || result.is_null() {
            return Err(MinerError::SubscriptionError(error_reason(error)));
        }

        let subscribed = SubscribeResult::from_result(result)
            .map_err(|e| MinerError::SubscriptionError(e.to_string()))?;
        let extranonce1 = hex::decode(&subscribed.extranonce1).map_err(|e| {
            MinerError::SubscriptionError(format!(
                "invalid extranonce1 {:?}: {}",
                subscribed.extranonce1, e
            ))
        })?;

        log::info!(
            "Subscribed (id {}), extranonce1 {}, extranonce2 size {}",
            subscribed.subscription_id,
            subscribed.extranonce1,
            subscribed.extranonce2_size
        );
        self.session = Some(Session {
            subscription_id: subscribed.subscription_id,
            extranonce1,
            extranonce2_size: subscribed.extranonce2_size,
            authorized: false,
        });
        self.set_state(SessionState::Subscribed);

        Ok(vec![Request::authorize(
            &self.config.worker_identity,
            &self.config.password,
        )])
    }

    fn on_authorize_response(&mut self, result: &Value, error: &Value) -> Result<(), MinerError> {
        if self.state != SessionState::Subscribed {
            log::debug!("Ignoring authorize response in state {}", self.state);
            return Ok(());
        }
        if result.as_bool() != Some(true) || !error.is_null() {
            let reason = if error.is_null() {
                "pool refused the worker".to_string()
            } else {
                error_reason(error)
            };
            return Err(MinerError::AuthorizationError(format!(
                "{}: {}",
                self.config.worker_identity, reason
            )));
        }

        if let Some(session) = self.session.as_mut() {
            session.authorized = true;
        }
        log::info!("Worker {} authorized", self.config.worker_identity);
        self.set_state(SessionState::Authorized);
        self.publish_work();
        Ok(())
    }

    fn on_submit_response(&mut self, id: u64, result: &Value, error: &Value) {
        let status = if result.as_bool() == Some(true) && error.is_null() {
            ShareStatus::Accepted
        } else if error.is_null() {
            ShareStatus::Rejected("rejected".to_string())
        } else {
            ShareStatus::Rejected(error_reason(error))
        };

        let Some(resolution) = self.ledger.resolve(id, status) else {
            log::debug!("Response for unknown submission {}", id);
            return;
        };

        let counters = self.ledger.counters();
        match &resolution.submitted.status {
            ShareStatus::Rejected(reason) => log::warn!(
                "Share {} rejected: {} ({}/{} accepted)",
                id,
                reason,
                counters.accepted,
                counters.sent
            ),
            _ => log::info!(
                "Share {} accepted in {} ms ({}/{} accepted)",
                id,
                resolution.latency.as_millis(),
                counters.accepted,
                counters.sent
            ),
        }

        self.emit(SessionEvent::ShareResolved {
            id,
            status: resolution.submitted.status.clone(),
            latency: resolution.latency,
        });

        if let Some(alert) = resolution.alert {
            log::warn!(
                "Rejection rate {:.0}% over the last {} shares; check target computation and job freshness",
                alert.rate * 100.0,
                alert.window
            );
            self.emit(SessionEvent::RejectionRateHigh(alert));
        }
    }

    fn handle_notification(&mut self, method: &str, params: &Value) {
        let inbound = match Inbound::parse(method, params) {
            Ok(inbound) => inbound,
            Err(e) => {
                log::warn!("Dropping {}: {}", method, e);
                return;
            }
        };

        match inbound {
            Inbound::Notify(notify) => match notify.to_job() {
                Ok(job) => self.on_notify(job),
                Err(e) => log::warn!("Dropping job {}: {}", notify.job_id, e),
            },
            Inbound::SetDifficulty(difficulty) => self.on_set_difficulty(difficulty),
            Inbound::SetExtranonce {
                extranonce1,
                extranonce2_size,
            } => self.on_set_extranonce(&extranonce1, extranonce2_size),
            Inbound::Unknown(method) => log::debug!("Ignoring notification {}", method),
        }
    }

    fn on_notify(&mut self, job: Job) {
        self.job_version += 1;
        let version = self.job_version;
        let clean_jobs = job.clean_jobs;

        log::info!(
            "New job {} (version {}, clean {})",
            job.job_id,
            version,
            clean_jobs
        );

        let incoming = VersionedJob {
            job: Arc::new(job),
            version,
        };
        if clean_jobs {
            self.previous = None;
            self.min_submittable_version = version;
        } else {
            self.previous = self.current.take();
        }
        self.emit(SessionEvent::NewJob {
            job_id: incoming.job.job_id.clone(),
            job_version: version,
            clean_jobs,
        });
        self.current = Some(incoming);

        self.publish_work();
    }

    fn on_set_difficulty(&mut self, difficulty: f64) {
        let target = match Target::from_difficulty(difficulty) {
            Ok(target) => target,
            Err(e) => {
                log::warn!("Ignoring difficulty {}: {}", difficulty, e);
                return;
            }
        };

        log::info!("Difficulty set to {} (target {})", difficulty, target);
        self.difficulty = difficulty;
        self.target = target;
        self.emit(SessionEvent::DifficultyChanged(difficulty));

        // same job version: lanes keep their nonce position
        self.publish_work();
    }

    fn on_set_extranonce(&mut self, extranonce1: &str, extranonce2_size: usize) {
        let decoded = match hex::decode(extranonce1) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Ignoring extranonce1 {:?}: {}", extranonce1, e);
                return;
            }
        };
        let Some(session) = self.session.as_mut() else {
            log::warn!("mining.set_extranonce before subscription, ignoring");
            return;
        };

        log::info!(
            "Extranonce changed to {} (extranonce2 size {})",
            extranonce1,
            extranonce2_size
        );
        session.extranonce1 = decoded;
        session.extranonce2_size = extranonce2_size;

        // every coinbase changes, so the current job is re-tagged and older
        // shares become stale
        self.job_version += 1;
        self.min_submittable_version = self.job_version;
        self.previous = None;
        if let Some(current) = self.current.as_mut() {
            current.version = self.job_version;
        }

        self.publish_work();
    }

    /// Hands the current snapshot to the scheduler once authorized.
    fn publish_work(&mut self) {
        let Some(session) = self.session.as_ref().filter(|s| s.authorized) else {
            return;
        };
        let Some(current) = self.current.as_ref() else {
            return;
        };

        self.scheduler.publish(Work::new(
            current.job.clone(),
            current.version,
            self.target,
            session.extranonce1.clone(),
            session.extranonce2_size,
        ));

        if self.state == SessionState::Authorized {
            self.set_state(SessionState::Mining);
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            log::debug!("Session {} -> {}", self.state, state);
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::scheduler::test_support::{GENESIS_COINB1, GENESIS_COINB2};
    use crate::miner::worker::Worker;
    use hex_literal::hex;
    use serde_json::json;
    use tokio::sync::mpsc;

    const GENESIS_NONCE: u32 = 2083236893;

    fn machine() -> (SessionStateMachine, Arc<Scheduler>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Scheduler::new(tx, 1_000));
        let config = SessionConfig {
            client_id: "stratum_miner-rs/test".into(),
            worker_identity: "alice.rig1".into(),
            password: "x".into(),
        };
        (
            SessionStateMachine::new(config, LedgerConfig::default(), scheduler.clone()),
            scheduler,
        )
    }

    fn response(id: u64, result: Value) -> Message {
        Message::Response {
            id: Some(id),
            result,
            error: Value::Null,
        }
    }

    fn error_response(id: u64, error: Value) -> Message {
        Message::Response {
            id: Some(id),
            result: Value::Null,
            error,
        }
    }

    fn notification(method: &str, params: Value) -> Message {
        Message::Notification {
            method: method.into(),
            params,
        }
    }

    fn genesis_notify(job_id: &str, clean_jobs: bool) -> Message {
        notification(
            "mining.notify",
            json!([
                job_id,
                "00".repeat(32),
                GENESIS_COINB1,
                GENESIS_COINB2,
                [],
                "00000001",
                "1d00ffff",
                "495fab29",
                clean_jobs
            ]),
        )
    }

    fn handshake(machine: &mut SessionStateMachine) {
        let subscribe = machine.on_connected();
        assert_eq!(subscribe.method, "mining.subscribe");
        let requests = machine
            .handle_message(response(SUBSCRIBE_ID, json!([[["mining.notify", "s1"]], "04ffff00", 4])))
            .unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "mining.authorize");
        assert_eq!(requests[0].params, json!(["alice.rig1", "x"]));
        machine.handle_message(response(AUTHORIZE_ID, json!(true))).unwrap();
    }

    fn share_for(job_id: &str, version: u64) -> Share {
        Share {
            job_version: version,
            job_id: job_id.into(),
            extranonce2: "00000000".into(),
            ntime: "495fab29".into(),
            nonce: 1,
            hash: [0u8; 32],
        }
    }

    #[test]
    fn handshake_moves_through_states() {
        let (mut machine, scheduler) = machine();
        assert_eq!(machine.state(), SessionState::Disconnected);

        machine.on_connected();
        assert_eq!(machine.state(), SessionState::Connecting);

        machine
            .handle_message(response(SUBSCRIBE_ID, json!([[["mining.notify", "s1"]], "04ffff00", 4])))
            .unwrap();
        assert_eq!(machine.state(), SessionState::Subscribed);
        assert_eq!(machine.subscription_id(), Some("s1"));
        assert_eq!(machine.extranonce1(), Some(&hex!("04ffff00")[..]));

        // jobs that arrive before authorization are held back
        machine.handle_message(genesis_notify("a", true)).unwrap();
        assert!(scheduler.current_work().is_none());

        machine.handle_message(response(AUTHORIZE_ID, json!(true))).unwrap();
        assert!(machine.is_authorized());
        assert_eq!(machine.state(), SessionState::Mining);

        let work = scheduler.current_work().unwrap();
        assert_eq!(work.job.job_id, "a");
        assert_eq!(work.job_version, machine.job_version());
        assert_eq!(work.extranonce2_size, 4);
    }

    #[test]
    fn authorized_without_job_waits() {
        let (mut machine, scheduler) = machine();
        handshake(&mut machine);
        assert_eq!(machine.state(), SessionState::Authorized);
        assert!(scheduler.current_work().is_none());

        machine.handle_message(genesis_notify("a", false)).unwrap();
        assert_eq!(machine.state(), SessionState::Mining);
    }

    #[test]
    fn end_to_end_share_is_accepted() {
        let (mut machine, scheduler) = machine();
        handshake(&mut machine);

        machine.handle_message(genesis_notify("a", false)).unwrap();
        machine
            .handle_message(notification("mining.set_difficulty", json!([1024])))
            .unwrap();
        assert_eq!(machine.difficulty(), 1024.0);

        let work = scheduler.current_work().unwrap();
        assert_eq!(work.target, Target::from_integer_difficulty(1024));

        let mut lane = Worker::new(work, hex!("1d010445").to_vec()).starting_at(GENESIS_NONCE - 500);
        let share = lane.search(1_000).share.expect("genesis nonce meets difficulty 1024");
        assert_eq!(share.nonce, GENESIS_NONCE);

        let submit = machine.on_share_found(share).unwrap();
        assert_eq!(submit.id, SUBMIT_ID_BASE);
        assert_eq!(submit.method, "mining.submit");
        assert_eq!(
            submit.params,
            json!(["alice.rig1", "a", "1d010445", "495fab29", "7c2bac1d"])
        );
        assert!(machine.ledger().is_pending(SUBMIT_ID_BASE));

        machine.handle_message(response(SUBMIT_ID_BASE, json!(true))).unwrap();
        let counters = machine.counters();
        assert_eq!((counters.sent, counters.accepted, counters.rejected), (1, 1, 0));
    }

    #[test]
    fn clean_jobs_makes_old_shares_stale() {
        let (mut machine, _scheduler) = machine();
        handshake(&mut machine);

        machine.handle_message(genesis_notify("a", false)).unwrap();
        let first = machine.job_version();
        machine.handle_message(genesis_notify("b", true)).unwrap();

        assert!(machine.on_share_found(share_for("a", first)).is_none());
        assert_eq!(machine.counters().stale, 1);
        assert_eq!(machine.counters().sent, 0);

        let current = machine.job_version();
        assert!(machine.on_share_found(share_for("b", current)).is_some());
    }

    #[test]
    fn previous_job_stays_submittable_without_clean_jobs() {
        let (mut machine, _scheduler) = machine();
        handshake(&mut machine);

        machine.handle_message(genesis_notify("a", false)).unwrap();
        let first = machine.job_version();
        machine.handle_message(genesis_notify("b", false)).unwrap();
        assert!(machine.on_share_found(share_for("a", first)).is_some());

        // only one superseded job is retained
        machine.handle_message(genesis_notify("c", false)).unwrap();
        assert!(machine.on_share_found(share_for("a", first)).is_none());
    }

    #[test]
    fn difficulty_change_keeps_job_version() {
        let (mut machine, scheduler) = machine();
        handshake(&mut machine);
        machine.handle_message(genesis_notify("a", true)).unwrap();
        let version = machine.job_version();

        machine
            .handle_message(notification("mining.set_difficulty", json!([32768])))
            .unwrap();
        let work = scheduler.current_work().unwrap();
        assert_eq!(work.job_version, version);
        assert_eq!(work.target, Target::from_integer_difficulty(32768));

        for bad in [json!([0]), json!([-4]), json!(["high"])] {
            machine
                .handle_message(notification("mining.set_difficulty", bad))
                .unwrap();
        }
        assert_eq!(machine.difficulty(), 32768.0);
    }

    #[test]
    fn set_extranonce_republishes_and_stales() {
        let (mut machine, scheduler) = machine();
        handshake(&mut machine);
        machine.handle_message(genesis_notify("a", false)).unwrap();
        let before = machine.job_version();

        machine
            .handle_message(notification("mining.set_extranonce", json!(["abcdef01", 8])))
            .unwrap();
        let work = scheduler.current_work().unwrap();
        assert_eq!(work.extranonce1, hex!("abcdef01").to_vec());
        assert_eq!(work.extranonce2_size, 8);
        assert!(work.job_version > before);

        assert!(machine.on_share_found(share_for("a", before)).is_none());
        assert!(
            machine
                .on_share_found(share_for("a", work.job_version))
                .is_some()
        );
    }

    #[test]
    fn oversized_extranonce2_is_refused() {
        let (mut machine, scheduler) = machine();
        machine.on_connected();
        let err = machine
            .handle_message(response(SUBSCRIBE_ID, json!([[], "00", 1u64 << 45])))
            .unwrap_err();
        assert!(matches!(err, MinerError::SubscriptionError(_)));
        assert_eq!(machine.state(), SessionState::Connecting);
        assert!(machine.extranonce1().is_none());

        machine.on_disconnected();
        handshake(&mut machine);
        machine.handle_message(genesis_notify("a", false)).unwrap();
        let before = scheduler.current_work().unwrap();

        let requests = machine
            .handle_message(notification("mining.set_extranonce", json!(["abcdef01", 1u64 << 45])))
            .unwrap();
        assert!(requests.is_empty());
        let after = scheduler.current_work().unwrap();
        assert_eq!(after.job_version, before.job_version);
        assert_eq!(after.extranonce2_size, 4);
        assert_eq!(machine.extranonce1(), Some(&hex!("04ffff00")[..]));
    }

    #[test]
    fn rejections_are_counted_and_non_fatal() {
        let (mut machine, _scheduler) = machine();
        handshake(&mut machine);
        machine.handle_message(genesis_notify("a", false)).unwrap();
        let version = machine.job_version();

        let submit = machine.on_share_found(share_for("a", version)).unwrap();
        machine
            .handle_message(error_response(submit.id, json!([23, "Low difficulty share", null])))
            .unwrap();

        let next = machine.on_share_found(share_for("a", version)).unwrap();
        assert_eq!(next.id, submit.id + 1);
        machine
            .handle_message(Message::Response {
                id: Some(next.id),
                result: json!(false),
                error: Value::Null,
            })
            .unwrap();

        let counters = machine.counters();
        assert_eq!((counters.sent, counters.accepted, counters.rejected), (2, 0, 2));
        assert_eq!(machine.state(), SessionState::Mining);
    }

    #[test]
    fn handshake_failures_are_errors() {
        let (mut machine, _scheduler) = machine();
        machine.on_connected();
        let err = machine
            .handle_message(error_response(SUBSCRIBE_ID, json!([20, "Busy", null])))
            .unwrap_err();
        assert!(matches!(err, MinerError::SubscriptionError(_)));

        machine.on_connected();
        machine
            .handle_message(response(SUBSCRIBE_ID, json!(["s", "00", 4])))
            .unwrap();
        let err = machine
            .handle_message(response(AUTHORIZE_ID, json!(false)))
            .unwrap_err();
        assert!(matches!(err, MinerError::AuthorizationError(_)));
        assert!(!machine.is_authorized());
    }

    #[test]
    fn malformed_notifications_are_dropped() {
        let (mut machine, _scheduler) = machine();
        handshake(&mut machine);
        let requests = machine
            .handle_message(notification("mining.notify", json!(["short"])))
            .unwrap();
        assert!(requests.is_empty());
        machine
            .handle_message(notification("client.reconnect", json!([])))
            .unwrap();
        assert!(machine.current_job().is_none());
        assert_eq!(machine.state(), SessionState::Authorized);
    }

    #[test]
    fn events_map_to_share_results() {
        let accepted = SessionEvent::ShareResolved {
            id: 100,
            status: ShareStatus::Accepted,
            latency: Duration::from_millis(20),
        };
        assert_eq!(accepted.share_result(), Some(ShareResult::Accepted));
        assert_eq!(
            SessionEvent::SharesLost(2).share_result(),
            Some(ShareResult::Lost(2))
        );
        assert_eq!(
            SessionEvent::StateChanged(SessionState::Mining).share_result(),
            None
        );
    }

    #[test]
    fn disconnect_drops_session_and_pending_shares() {
        let (mut machine, scheduler) = machine();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        machine = machine.with_events(events_tx);
        handshake(&mut machine);
        machine.handle_message(genesis_notify("a", false)).unwrap();
        let version = machine.job_version();
        machine.on_share_found(share_for("a", version)).unwrap();

        machine.on_disconnected();
        assert_eq!(machine.state(), SessionState::Disconnected);
        assert!(scheduler.current_work().is_none());
        assert!(machine.extranonce1().is_none());
        assert_eq!(machine.counters().lost, 1);

        // a share still in the channel from the dead connection
        assert!(machine.on_share_found(share_for("a", version)).is_none());

        // reconnect: full handshake again, submit ids restart
        machine.on_reconnecting();
        handshake(&mut machine);
        machine.handle_message(genesis_notify("a", true)).unwrap();
        let version = machine.job_version();
        let submit = machine.on_share_found(share_for("a", version)).unwrap();
        assert_eq!(submit.id, SUBMIT_ID_BASE);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&SessionEvent::SharesLost(1)));
        assert!(seen.contains(&SessionEvent::StateChanged(SessionState::Reconnecting)));
    }
}
