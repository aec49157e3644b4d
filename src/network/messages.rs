//! Stratum V1 message types.
//!
//! Requests the miner sends are built here; inbound notifications and
//! handshake results are parsed from their positional JSON arrays.

use crate::miner::job::Job;
use crate::miner::scheduler::Share;
use crate::utils::error::MinerError;
use serde::Serialize;
use serde_json::{Value, json};

/// Request id of `mining.subscribe`
pub const SUBSCRIBE_ID: u64 = 1;
/// Request id of `mining.authorize`
pub const AUTHORIZE_ID: u64 = 2;
/// Request id of keep-alive pings
pub const PING_ID: u64 = 3;
/// Submissions use `SUBMIT_ID_BASE + n`
pub const SUBMIT_ID_BASE: u64 = 100;

/// Widest extranonce2 accepted from a pool, in bytes
pub const MAX_EXTRANONCE2_SIZE: usize = 16;

/// An outbound JSON-RPC request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Request {
            id,
            method: method.to_string(),
            params,
        }
    }

    /// `mining.subscribe [clientIdentifier]`
    pub fn subscribe(client_id: &str) -> Self {
        Self::new(SUBSCRIBE_ID, "mining.subscribe", json!([client_id]))
    }

    /// `mining.authorize [workerIdentity, password]`
    pub fn authorize(worker_identity: &str, password: &str) -> Self {
        Self::new(AUTHORIZE_ID, "mining.authorize", json!([worker_identity, password]))
    }

    /// `mining.submit [workerIdentity, jobId, extraNonce2, nTime, nonce]`
    pub fn submit(id: u64, worker_identity: &str, share: &Share) -> Self {
        Self::new(
            id,
            "mining.submit",
            json!([
                worker_identity,
                share.job_id,
                share.extranonce2,
                share.ntime,
                share.nonce_hex()
            ]),
        )
    }

    pub fn ping() -> Self {
        Self::new(PING_ID, "mining.ping", json!([]))
    }
}

/// A decoded inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Server-initiated message carrying a `method`
    Notification { method: String, params: Value },
    /// Reply to one of our requests
    Response {
        id: Option<u64>,
        result: Value,
        error: Value,
    },
}

impl Message {
    /// Classifies a parsed JSON object.
    ///
    /// Anything with a `method` is a notification (Stratum pools send
    /// `"id": null` on those); anything else with an `id` is a response.
    pub fn from_value(value: Value) -> Result<Self, MinerError> {
        let Value::Object(mut object) = value else {
            return Err(MinerError::ProtocolError("message is not an object".into()));
        };

        if let Some(method) = object.get("method") {
            let method = method
                .as_str()
                .ok_or_else(|| MinerError::ProtocolError("method is not a string".into()))?
                .to_string();
            let params = object.remove("params").unwrap_or(Value::Array(vec![]));
            return Ok(Message::Notification { method, params });
        }

        if let Some(id) = object.get("id") {
            let id = id.as_u64();
            return Ok(Message::Response {
                id,
                result: object.remove("result").unwrap_or(Value::Null),
                error: object.remove("error").unwrap_or(Value::Null),
            });
        }

        Err(MinerError::ProtocolError(
            "message has neither method nor id".into(),
        ))
    }
}

/// Notifications the session acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Notify(Notify),
    SetDifficulty(f64),
    SetExtranonce {
        extranonce1: String,
        extranonce2_size: usize,
    },
    /// Any other method; logged and discarded
    Unknown(String),
}

impl Inbound {
    pub fn parse(method: &str, params: &Value) -> Result<Self, MinerError> {
        match method {
            "mining.notify" => Ok(Inbound::Notify(Notify::from_params(params)?)),
            "mining.set_difficulty" => {
                let difficulty = param(params, 0, method)?
                    .as_f64()
                    .ok_or_else(|| protocol(method, "difficulty is not a number"))?;
                Ok(Inbound::SetDifficulty(difficulty))
            }
            "mining.set_extranonce" => {
                let extranonce1 = string_param(params, 0, method)?;
                let extranonce2_size = extranonce2_size(param(params, 1, method)?, method)?;
                Ok(Inbound::SetExtranonce {
                    extranonce1,
                    extranonce2_size,
                })
            }
            other => Ok(Inbound::Unknown(other.to_string())),
        }
    }
}

/// Positional `mining.notify` parameters, still hex encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notify {
    pub job_id: String,
    pub prev_hash: String,
    pub coinbase_part1: String,
    pub coinbase_part2: String,
    pub merkle_branch: Vec<String>,
    pub version: String,
    pub nbits: String,
    pub ntime: String,
    pub clean_jobs: bool,
}

impl Notify {
    const METHOD: &'static str = "mining.notify";

    pub fn from_params(params: &Value) -> Result<Self, MinerError> {
        let method = Self::METHOD;
        let merkle_branch = param(params, 4, method)?
            .as_array()
            .ok_or_else(|| protocol(method, "merkle branch is not an array"))?
            .iter()
            .map(|node| {
                node.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| protocol(method, "merkle branch entry is not a string"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Notify {
            job_id: string_param(params, 0, method)?,
            prev_hash: string_param(params, 1, method)?,
            coinbase_part1: string_param(params, 2, method)?,
            coinbase_part2: string_param(params, 3, method)?,
            merkle_branch,
            version: string_param(params, 5, method)?,
            nbits: string_param(params, 6, method)?,
            ntime: string_param(params, 7, method)?,
            clean_jobs: param(params, 8, method)?.as_bool().unwrap_or(false),
        })
    }

    /// Decodes the hex fields into a [`Job`].
    pub fn to_job(&self) -> Result<Job, MinerError> {
        Job::from_hex(
            &self.job_id,
            &self.prev_hash,
            &self.coinbase_part1,
            &self.coinbase_part2,
            &self.merkle_branch,
            &self.version,
            &self.nbits,
            &self.ntime,
            self.clean_jobs,
        )
    }
}

/// Result of `mining.subscribe`: `[subscriptionDetails, extraNonce1, extraNonce2Size]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeResult {
    pub subscription_id: String,
    pub extranonce1: String,
    pub extranonce2_size: usize,
}

impl SubscribeResult {
    pub fn from_result(result: &Value) -> Result<Self, MinerError> {
        let method = "mining.subscribe";
        let details = param(result, 0, method)?;

        Ok(SubscribeResult {
            subscription_id: subscription_id(details),
            extranonce1: string_param(result, 1, method)?,
            extranonce2_size: extranonce2_size(param(result, 2, method)?, method)?,
        })
    }
}

/// Picks the `mining.notify` subscription id out of the details array,
/// falling back to whatever the pool sent.
fn subscription_id(details: &Value) -> String {
    if let Some(pairs) = details.as_array() {
        for pair in pairs {
            if let Some([name, id]) = pair.as_array().map(Vec::as_slice) {
                if name.as_str() == Some("mining.notify") {
                    if let Some(id) = id.as_str() {
                        return id.to_string();
                    }
                }
            }
        }
    }

    match details {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Human-readable reason from a Stratum error value.
///
/// Pools send `[code, message, data]`, an object with `message`, or a bare
/// string.
pub fn error_reason(error: &Value) -> String {
    match error {
        Value::Array(items) => match (items.first(), items.get(1)) {
            (Some(code), Some(Value::String(message))) => format!("{} ({})", message, code),
            _ => error.to_string(),
        },
        Value::Object(object) => object
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        Value::String(message) => message.clone(),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}

fn param<'a>(params: &'a Value, index: usize, method: &str) -> Result<&'a Value, MinerError> {
    params
        .as_array()
        .and_then(|items| items.get(index))
        .ok_or_else(|| protocol(method, &format!("missing param {}", index)))
}

fn string_param(params: &Value, index: usize, method: &str) -> Result<String, MinerError> {
    param(params, index, method)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| protocol(method, &format!("param {} is not a string", index)))
}

/// Extranonce2 width, bounded to `1..=MAX_EXTRANONCE2_SIZE`.
fn extranonce2_size(value: &Value, method: &str) -> Result<usize, MinerError> {
    let size = value
        .as_u64()
        .ok_or_else(|| protocol(method, "extranonce2 size is not an integer"))?;
    if size == 0 || size > MAX_EXTRANONCE2_SIZE as u64 {
        return Err(protocol(
            method,
            &format!(
                "extranonce2 size {} outside 1..={}",
                size, MAX_EXTRANONCE2_SIZE
            ),
        ));
    }
    Ok(size as usize)
}

fn protocol(method: &str, detail: &str) -> MinerError {
    MinerError::ProtocolError(format!("{}: {}", method, detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_use_fixed_ids_and_param_order() {
        let subscribe = Request::subscribe("stratum_miner-rs/0.1.0");
        assert_eq!(subscribe.id, SUBSCRIBE_ID);
        assert_eq!(subscribe.params, json!(["stratum_miner-rs/0.1.0"]));

        let authorize = Request::authorize("alice.rig1", "x");
        assert_eq!(authorize.id, AUTHORIZE_ID);
        assert_eq!(authorize.params, json!(["alice.rig1", "x"]));

        let share = Share {
            job_version: 3,
            job_id: "b4".into(),
            extranonce2: "00000001".into(),
            ntime: "495fab29".into(),
            nonce: 0x7c2bac1d,
            hash: [0u8; 32],
        };
        let submit = Request::submit(SUBMIT_ID_BASE + 4, "alice.rig1", &share);
        assert_eq!(submit.id, 104);
        assert_eq!(
            submit.params,
            json!(["alice.rig1", "b4", "00000001", "495fab29", "7c2bac1d"])
        );
    }

    #[test]
    fn classifies_notifications_and_responses() {
        let notification =
            Message::from_value(json!({"id": null, "method": "mining.set_difficulty", "params": [8]}))
                .unwrap();
        assert_eq!(
            notification,
            Message::Notification {
                method: "mining.set_difficulty".into(),
                params: json!([8]),
            }
        );

        let response = Message::from_value(json!({"id": 2, "result": true, "error": null})).unwrap();
        assert_eq!(
            response,
            Message::Response {
                id: Some(2),
                result: json!(true),
                error: Value::Null,
            }
        );

        assert!(Message::from_value(json!([1, 2])).is_err());
        assert!(Message::from_value(json!({"result": true})).is_err());
    }

    #[test]
    fn parses_notify() {
        let params = json!([
            "job1",
            "00".repeat(32),
            "01",
            "02",
            ["11".repeat(32)],
            "20000000",
            "1d00ffff",
            "495fab29",
            true
        ]);

        let inbound = Inbound::parse("mining.notify", &params).unwrap();
        let Inbound::Notify(notify) = inbound else {
            panic!("expected notify");
        };
        assert_eq!(notify.job_id, "job1");
        assert!(notify.clean_jobs);

        let job = notify.to_job().unwrap();
        assert_eq!(job.merkle_branch, vec![[0x11u8; 32]]);
        assert_eq!(job.version, 0x2000_0000);
    }

    #[test]
    fn short_notify_is_a_protocol_error() {
        let err = Inbound::parse("mining.notify", &json!(["job1", "00"])).unwrap_err();
        assert!(matches!(err, MinerError::ProtocolError(_)));
    }

    #[test]
    fn parses_difficulty_and_extranonce() {
        assert_eq!(
            Inbound::parse("mining.set_difficulty", &json!([1024])).unwrap(),
            Inbound::SetDifficulty(1024.0)
        );
        assert_eq!(
            Inbound::parse("mining.set_difficulty", &json!([0.5])).unwrap(),
            Inbound::SetDifficulty(0.5)
        );
        assert_eq!(
            Inbound::parse("mining.set_extranonce", &json!(["abcd", 6])).unwrap(),
            Inbound::SetExtranonce {
                extranonce1: "abcd".into(),
                extranonce2_size: 6,
            }
        );
        assert_eq!(
            Inbound::parse("client.show_message", &json!(["hi"])).unwrap(),
            Inbound::Unknown("client.show_message".into())
        );
    }

    #[test]
    fn parses_subscribe_result() {
        let result = json!([
            [["mining.set_difficulty", "d1"], ["mining.notify", "n1"]],
            "08000002",
            4
        ]);
        let subscribed = SubscribeResult::from_result(&result).unwrap();
        assert_eq!(subscribed.subscription_id, "n1");
        assert_eq!(subscribed.extranonce1, "08000002");
        assert_eq!(subscribed.extranonce2_size, 4);

        let flat = SubscribeResult::from_result(&json!(["sub", "ff", 8])).unwrap();
        assert_eq!(flat.subscription_id, "sub");

        assert!(SubscribeResult::from_result(&json!(null)).is_err());
    }

    #[test]
    fn extranonce2_size_out_of_range_is_a_protocol_error() {
        for size in [json!(0), json!(17u64), json!(1u64 << 45), json!(-1)] {
            let err = SubscribeResult::from_result(&json!([[], "00", size])).unwrap_err();
            assert!(matches!(err, MinerError::ProtocolError(_)), "subscribe size {size}");

            let err = Inbound::parse("mining.set_extranonce", &json!(["00", size])).unwrap_err();
            assert!(matches!(err, MinerError::ProtocolError(_)), "set_extranonce size {size}");
        }

        let widest = SubscribeResult::from_result(&json!([[], "00", MAX_EXTRANONCE2_SIZE])).unwrap();
        assert_eq!(widest.extranonce2_size, MAX_EXTRANONCE2_SIZE);
    }

    #[test]
    fn error_reasons() {
        assert_eq!(error_reason(&json!([23, "Low difficulty share", null])), "Low difficulty share (23)");
        assert_eq!(error_reason(&json!({"code": 21, "message": "Stale"})), "Stale");
        assert_eq!(error_reason(&json!("Job not found")), "Job not found");
        assert_eq!(error_reason(&Value::Null), "unknown");
    }
}
