// src/network/pool.rs

//! Mining pool client implementation
//!
//! Owns the single TCP connection to a Stratum V1 pool. All socket I/O and
//! every session transition happen on this task; hashing runs elsewhere and
//! only reaches the pool through the share channel.
use crate::miner::scheduler::Share;
use crate::network::backoff::{Backoff, BackoffPolicy};
use crate::network::codec::StratumCodec;
use crate::network::messages::Request;
use crate::network::session::SessionStateMachine;
use crate::network::session::SessionConfig;
use crate::utils::error::MinerError;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{self, Instant, Interval};
use tokio_util::codec::{FramedRead, FramedWrite};
use url::{Host, Url};

/// Configuration for connecting to a mining pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool address (e.g., "stratum+tcp://pool.example.com:3333")
    pub url: String,
    /// Pool account name
    pub username: String,
    /// Worker name appended to the username
    #[serde(default = "default_worker_id")]
    pub worker_id: String,
    /// Worker password (often "x" if not required)
    #[serde(default = "default_password")]
    pub password: String,
    /// Client identifier sent with `mining.subscribe`
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_worker_id() -> String {
    "worker01".into()
}

fn default_password() -> String {
    "x".into()
}

fn default_client_id() -> String {
    format!("stratum_miner-rs/{}", env!("CARGO_PKG_VERSION"))
}

impl PoolConfig {
    /// `"{username}.{worker_id}"`, as used in authorize and submit
    pub fn worker_identity(&self) -> String {
        format!("{}.{}", self.username, self.worker_id)
    }

    pub fn endpoint(&self) -> Result<PoolEndpoint, MinerError> {
        PoolEndpoint::parse(&self.url)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            client_id: self.client_id.clone(),
            worker_identity: self.worker_identity(),
            password: self.password.clone(),
        }
    }
}

/// Pool address as `host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEndpoint {
    pub host: String,
    pub port: u16,
}

impl PoolEndpoint {
    /// Parses `host:port` or `stratum+tcp://host:port`.
    ///
    /// # Errors
    /// Returns `MinerError::ConfigError` if the URL is malformed, uses an
    /// unsupported scheme, or has no port.
    pub fn parse(address: &str) -> Result<Self, MinerError> {
        let address = address.trim();
        let full = if address.contains("://") {
            address.to_string()
        } else {
            format!("stratum+tcp://{}", address)
        };

        let url = Url::parse(&full)
            .map_err(|e| MinerError::ConfigError(format!("Invalid pool URL '{}': {}", address, e)))?;

        match url.scheme() {
            "stratum+tcp" | "tcp" => {}
            other => {
                return Err(MinerError::ConfigError(format!(
                    "Unsupported pool scheme '{}' in '{}'; use stratum+tcp://",
                    other, address
                )));
            }
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            _ => {
                return Err(MinerError::ConfigError(format!(
                    "Pool URL '{}' has no host",
                    address
                )));
            }
        };
        let port = url.port().ok_or_else(|| {
            MinerError::ConfigError(format!("Pool URL '{}' has no port", address))
        })?;

        Ok(PoolEndpoint { host, port })
    }
}

impl fmt::Display for PoolEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Connection timing and retry settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on a single TCP connect
    pub connect_timeout: Duration,
    /// Subscribe and authorize must both complete within this
    pub handshake_timeout: Duration,
    /// `mining.ping` period; `None` disables it
    pub keepalive_interval: Option<Duration>,
    pub backoff: BackoffPolicy,
    /// Consecutive authorization failures before giving up
    pub max_auth_failures: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            connect_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(30),
            keepalive_interval: Some(Duration::from_secs(30)),
            backoff: BackoffPolicy::default(),
            max_auth_failures: 5,
        }
    }
}

/// Client for communicating with a mining pool
///
/// Handles all pool protocol interactions including:
/// - Connection management with bounded reconnect
/// - The subscribe/authorize handshake
/// - Share submission
/// - Keepalive messages
pub struct PoolClient {
    /// Where to connect
    endpoint: PoolEndpoint,
    /// Session transitions; the only place session state changes
    machine: SessionStateMachine,
    /// Shares found by the search thread
    share_receiver: UnboundedReceiver<Share>,
    options: ClientOptions,
    backoff: Backoff,
    auth_failures: u32,
}

impl PoolClient {
    /// Creates a new PoolClient instance
    ///
    /// # Arguments
    /// * `endpoint` - Pool address
    /// * `machine` - Session state machine wired to the scheduler
    /// * `share_receiver` - Channel for receiving shares from the search thread
    /// * `options` - Timeouts, keepalive and reconnect policy
    pub fn new(
        endpoint: PoolEndpoint,
        machine: SessionStateMachine,
        share_receiver: UnboundedReceiver<Share>,
        options: ClientOptions,
    ) -> Self {
        PoolClient {
            endpoint,
            machine,
            share_receiver,
            backoff: Backoff::new(options.backoff.clone()),
            options,
            auth_failures: 0,
        }
    }

    /// Session state machine, for inspection
    pub fn session(&self) -> &SessionStateMachine {
        &self.machine
    }

    /// Connects, mines, and reconnects until the retry budget runs out
    ///
    /// Only one connection exists at a time: a new attempt starts only after
    /// the previous socket has been torn down and the backoff delay elapsed.
    ///
    /// # Errors
    /// Returns `MinerError` if:
    /// - The reconnect budget is exhausted
    /// - Authorization failed `max_auth_failures` times in a row
    /// - A non-transient error occurs
    pub async fn run(&mut self) -> Result<(), MinerError> {
        loop {
            match self.connect().await {
                Ok(stream) => {
                    let outcome = self.serve(stream).await;
                    self.machine.on_disconnected();

                    match outcome {
                        Ok(()) => log::warn!("Pool {} closed the connection", self.endpoint),
                        Err(MinerError::AuthorizationError(reason)) => {
                            self.auth_failures += 1;
                            log::error!(
                                "Authorization failed ({}/{}): {}",
                                self.auth_failures,
                                self.options.max_auth_failures,
                                reason
                            );
                            if self.auth_failures >= self.options.max_auth_failures {
                                return Err(MinerError::AuthorizationError(format!(
                                    "{} (gave up after {} attempts)",
                                    reason, self.auth_failures
                                )));
                            }
                        }
                        Err(e) if e.is_transient() => {
                            log::warn!("Connection to {} lost: {}", self.endpoint, e)
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) if e.is_transient() => {
                    log::warn!("Connecting to {} failed: {}", self.endpoint, e)
                }
                Err(e) => return Err(e),
            }

            let Some(delay) = self.backoff.next_delay() else {
                return Err(MinerError::ConnectionError(format!(
                    "Giving up on {} after {} reconnect attempts",
                    self.endpoint,
                    self.backoff.attempts()
                )));
            };

            self.machine.on_reconnecting();
            log::info!(
                "Reconnecting to {} in {:.1}s (attempt {})",
                self.endpoint,
                delay.as_secs_f64(),
                self.backoff.attempts()
            );
            time::sleep(delay).await;
        }
    }

    /// Establishes the TCP connection with keep-alive enabled
    ///
    /// # Errors
    /// Returns `MinerError` if:
    /// - DNS resolution fails
    /// - Every resolved address refuses or times out
    async fn connect(&self) -> Result<TcpStream, MinerError> {
        let addrs = lookup_host((self.endpoint.host.as_str(), self.endpoint.port))
            .await
            .map_err(|e| {
                MinerError::ConnectionError(format!(
                    "DNS resolution failed for {}: {}",
                    self.endpoint, e
                ))
            })?;

        let mut last_error = None;
        for addr in addrs {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.set_keepalive(true)?;

            match time::timeout(self.options.connect_timeout, socket.connect(addr)).await {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true)?;
                    log::info!("Connected to {} ({})", self.endpoint, addr);
                    return Ok(stream);
                }
                Ok(Err(e)) => {
                    last_error = Some(MinerError::ConnectionError(format!("{}: {}", addr, e)))
                }
                Err(_) => {
                    last_error = Some(MinerError::TimeoutError(format!(
                        "connect to {} timed out after {:?}",
                        addr, self.options.connect_timeout
                    )))
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            MinerError::ConnectionError(format!("{} resolved to no addresses", self.endpoint))
        }))
    }

    /// Runs one connection until it closes or fails
    ///
    /// Returns `Ok(())` when the pool closes the socket cleanly.
    async fn serve(&mut self, stream: TcpStream) -> Result<(), MinerError> {
        let (reader, writer) = stream.into_split();
        let mut reader = FramedRead::new(reader, StratumCodec::new());
        let mut writer = FramedWrite::new(writer, StratumCodec::new());

        // anything found for the previous connection can't be submitted here
        while let Ok(share) = self.share_receiver.try_recv() {
            self.machine.on_share_found(share);
        }

        writer.send(self.machine.on_connected()).await?;

        let handshake_deadline = time::sleep(self.options.handshake_timeout);
        tokio::pin!(handshake_deadline);
        let mut keepalive = self.options.keepalive_interval.map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            interval
        });
        let mut authorized = false;

        loop {
            tokio::select! {
                message = reader.next() => {
                    let Some(message) = message.transpose()? else {
                        return Ok(());
                    };
                    let requests = self.machine.handle_message(message)?;
                    send_all(&mut writer, requests).await?;
                    if !authorized && self.machine.is_authorized() {
                        authorized = true;
                        self.backoff.reset();
                        self.auth_failures = 0;
                    }
                }
                Some(share) = self.share_receiver.recv() => {
                    if let Some(request) = self.machine.on_share_found(share) {
                        writer.send(request).await?;
                    }
                }
                _ = &mut handshake_deadline, if !authorized => {
                    return Err(MinerError::TimeoutError(format!(
                        "handshake with {} not completed within {:?}",
                        self.endpoint, self.options.handshake_timeout
                    )));
                }
                _ = tick(&mut keepalive) => {
                    writer.send(Request::ping()).await?;
                }
            }
        }
    }
}

/// Queues every request, then flushes once
async fn send_all(
    writer: &mut FramedWrite<OwnedWriteHalf, StratumCodec>,
    requests: Vec<Request>,
) -> Result<(), MinerError> {
    if requests.is_empty() {
        return Ok(());
    }
    for request in requests {
        writer.feed(request).await?;
    }
    writer.flush().await
}

/// Next keepalive tick, or never when keepalive is disabled
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
