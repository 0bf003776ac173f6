//! # Broadcast Resolver
//!
//! Runs one resolution round: a node-status probe per broadcast target, all in
//! parallel, each listening until its own deadline.
//!
//! Every probe task owns its socket, so the socket is closed exactly once when
//! the task ends, whether it timed out, failed, or was aborted. Sockets come
//! from a [`ProbeSockets`] implementation, [`EphemeralSockets`] by default.
//!
//! Replies do not touch shared state; they are forwarded over a channel to the
//! `resolve` future, which is the only writer of the round's host map.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use lanshare_common::config::{Config, NETBIOS_NS_PORT};
use lanshare_common::network::interface::BroadcastTarget;
use lanshare_protocols::netbios::{self, NodeStatus};
use serde::Serialize;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

const MAX_DATAGRAM: usize = 1500;

#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    pub port: u16,
    pub timeout: Duration,
    pub attempts: u8,
    pub retry_interval: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            port: NETBIOS_NS_PORT,
            timeout: Duration::from_millis(2000),
            attempts: 2,
            retry_interval: Duration::from_millis(250),
        }
    }
}

impl From<&Config> for ResolverConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            port: cfg.port,
            timeout: cfg.timeout,
            attempts: cfg.attempts.max(1),
            retry_interval: cfg.retry_interval,
        }
    }
}

/// How a record got into the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RecordSource {
    /// Answered a probe sent on this interface.
    Broadcast { interface: String },
    /// Supplied by the caller.
    Seeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRecord {
    pub hostname: String,
    pub address: Ipv4Addr,
    pub last_seen: SystemTime,
    pub source: RecordSource,
    /// Every unique name the responder advertised.
    pub names: Vec<String>,
}

impl HostRecord {
    pub fn seeded(hostname: impl Into<String>, address: Ipv4Addr) -> Self {
        let hostname: String = hostname.into();
        Self {
            names: vec![hostname.clone()],
            hostname,
            address,
            last_seen: SystemTime::now(),
            source: RecordSource::Seeded,
        }
    }

    /// Case-insensitive cache key.
    pub fn key(&self) -> String {
        host_key(&self.hostname)
    }
}

pub(crate) fn host_key(hostname: &str) -> String {
    hostname.trim().to_ascii_uppercase()
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to open socket for {interface}: {source}")]
    SocketOpenFailed {
        interface: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to send probe on {interface} to {target}: {source}")]
    SocketSendFailed {
        interface: String,
        target: SocketAddrV4,
        #[source]
        source: io::Error,
    },
}

impl ProbeError {
    pub fn interface(&self) -> &str {
        match self {
            Self::SocketOpenFailed { interface, .. } | Self::SocketSendFailed { interface, .. } => {
                interface
            }
        }
    }
}

/// Result of one round. Failed probes degrade the host map but never fail
/// the round.
#[derive(Debug, Default)]
pub struct RoundOutcome {
    pub hosts: HashMap<String, HostRecord>,
    pub failures: Vec<ProbeError>,
}

impl RoundOutcome {
    /// Last write wins per hostname.
    fn merge(&mut self, record: HostRecord) {
        let key: String = record.key();
        if let Some(previous) = self.hosts.get(&key)
            && previous.address != record.address
        {
            debug!(
                "{} answered from {} after {}, keeping the later address",
                record.hostname, record.address, previous.address
            );
        }
        self.hosts.insert(key, record);
    }
}

/// Opens the socket a probe sends from and listens on.
#[async_trait]
pub trait ProbeSockets: Send + Sync {
    async fn open(&self, target: &BroadcastTarget) -> io::Result<UdpSocket>;
}

/// An ephemeral IPv4 socket with `SO_BROADCAST` set.
#[derive(Debug, Default, Clone, Copy)]
pub struct EphemeralSockets;

#[async_trait]
impl ProbeSockets for EphemeralSockets {
    async fn open(&self, _target: &BroadcastTarget) -> io::Result<UdpSocket> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        Ok(socket)
    }
}

pub struct BroadcastResolver {
    config: ResolverConfig,
    sockets: Arc<dyn ProbeSockets>,
}

impl BroadcastResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_sockets(config, Arc::new(EphemeralSockets))
    }

    pub fn with_sockets(config: ResolverConfig, sockets: Arc<dyn ProbeSockets>) -> Self {
        Self { config, sockets }
    }

    /// Probes every target concurrently and collects the replies.
    ///
    /// Completes once every probe has reached its deadline, so the wall time
    /// is roughly `timeout` no matter how many targets are given.
    pub async fn resolve(&self, targets: &[BroadcastTarget]) -> RoundOutcome {
        let mut outcome = RoundOutcome::default();
        if targets.is_empty() {
            debug!("no broadcast targets, skipping resolution round");
            return outcome;
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<HostRecord>();
        let mut probes: JoinSet<Result<usize, ProbeError>> = JoinSet::new();

        for target in targets {
            let target: BroadcastTarget = target.clone();
            let config: ResolverConfig = self.config;
            let sockets: Arc<dyn ProbeSockets> = Arc::clone(&self.sockets);
            let tx: UnboundedSender<HostRecord> = tx.clone();
            probes.spawn(async move {
                let probe = ResolutionProbe::open(sockets.as_ref(), target, &config).await?;
                probe.run(&config, tx).await
            });
        }
        drop(tx);

        loop {
            tokio::select! {
                Some(record) = rx.recv() => outcome.merge(record),
                joined = probes.join_next() => match joined {
                    Some(Ok(Ok(replies))) => debug!("probe finished with {replies} replies"),
                    Some(Ok(Err(err))) => {
                        warn!("{err}");
                        outcome.failures.push(err);
                    }
                    Some(Err(err)) => warn!("probe task ended abnormally: {err}"),
                    None => break,
                },
            }
        }

        // probes are done, so everything they sent is already queued
        while let Ok(record) = rx.try_recv() {
            outcome.merge(record);
        }

        info!(
            "resolution round finished: {} host(s), {} failed probe(s)",
            outcome.hosts.len(),
            outcome.failures.len()
        );
        outcome
    }
}

/// One in-flight node-status request on one interface.
struct ResolutionProbe {
    session_id: u16,
    target: BroadcastTarget,
    destination: SocketAddrV4,
    socket: UdpSocket,
    deadline: Instant,
}

impl ResolutionProbe {
    async fn open(
        sockets: &dyn ProbeSockets,
        target: BroadcastTarget,
        config: &ResolverConfig,
    ) -> Result<Self, ProbeError> {
        let socket: UdpSocket = sockets.open(&target).await.map_err(|source| {
            ProbeError::SocketOpenFailed {
                interface: target.interface_name.clone(),
                source,
            }
        })?;

        Ok(Self {
            session_id: netbios::random_transaction_id(),
            destination: SocketAddrV4::new(target.broadcast_address, config.port),
            target,
            socket,
            deadline: Instant::now() + config.timeout,
        })
    }

    async fn run(
        self,
        config: &ResolverConfig,
        tx: UnboundedSender<HostRecord>,
    ) -> Result<usize, ProbeError> {
        let query: Vec<u8> = netbios::create_node_status_query(self.session_id);
        self.send(&query).await?;
        debug!(
            "probe {:#06x} sent on {} to {}",
            self.session_id, self.target.interface_name, self.destination
        );

        let mut sent: u8 = 1;
        let mut replies: usize = 0;
        let mut buf = [0u8; MAX_DATAGRAM];

        let deadline = sleep_until(self.deadline);
        tokio::pin!(deadline);
        let retry = sleep(config.retry_interval);
        tokio::pin!(retry);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = &mut retry, if sent < config.attempts => {
                    if let Err(err) = self.send(&query).await {
                        debug!("repeat probe failed: {err}");
                    }
                    sent += 1;
                    retry.as_mut().reset(Instant::now() + config.retry_interval);
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, src)) => {
                        if let Some(record) = self.accept(&buf[..len], src) {
                            replies += 1;
                            if tx.send(record).is_err() {
                                break;
                            }
                        }
                    }
                    Err(err) if is_transient(&err) => continue,
                    Err(err) => {
                        warn!("receive failed on {}: {err}", self.target.interface_name);
                        break;
                    }
                },
            }
        }

        debug!("probe {:#06x} on {} closed", self.session_id, self.target.interface_name);
        Ok(replies)
    }

    async fn send(&self, query: &[u8]) -> Result<(), ProbeError> {
        self.socket
            .send_to(query, self.destination)
            .await
            .map(|_| ())
            .map_err(|source| ProbeError::SocketSendFailed {
                interface: self.target.interface_name.clone(),
                target: self.destination,
                source,
            })
    }

    /// Turns a datagram into a record if it answers this probe.
    fn accept(&self, datagram: &[u8], src: SocketAddr) -> Option<HostRecord> {
        let status: NodeStatus = match netbios::parse_node_status_response(datagram) {
            Ok(status) => status,
            Err(err) => {
                debug!("ignoring datagram from {src}: {err}");
                return None;
            }
        };
        if status.transaction_id != self.session_id {
            debug!("ignoring reply from {src} for session {:#06x}", status.transaction_id);
            return None;
        }
        let SocketAddr::V4(src_v4) = src else {
            return None;
        };
        let hostname: String = status.hostname()?.to_string();

        let mut names: Vec<String> = Vec::new();
        for entry in status.names.iter().filter(|n| !n.group) {
            if !names.contains(&entry.name) {
                names.push(entry.name.clone());
            }
        }

        debug!("{hostname} is at {}", src_v4.ip());
        Some(HostRecord {
            hostname,
            address: *src_v4.ip(),
            last_seen: SystemTime::now(),
            source: RecordSource::Broadcast {
                interface: self.target.interface_name.clone(),
            },
            names,
        })
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanshare_protocols::netbios::{NodeName, SUFFIX_FILE_SERVER};

    fn record(hostname: &str, address: [u8; 4]) -> HostRecord {
        HostRecord {
            hostname: hostname.to_string(),
            address: Ipv4Addr::from(address),
            last_seen: SystemTime::now(),
            source: RecordSource::Broadcast {
                interface: "eth0".into(),
            },
            names: vec![hostname.to_string()],
        }
    }

    fn loopback_target(name: &str) -> BroadcastTarget {
        BroadcastTarget {
            interface_name: name.to_string(),
            broadcast_address: Ipv4Addr::LOCALHOST,
        }
    }

    /// Refuses to open for `refused`, opens without `SO_BROADCAST` for
    /// `no_broadcast`, and opens normally otherwise.
    struct ScriptedSockets {
        refused: &'static str,
        no_broadcast: &'static str,
    }

    #[async_trait]
    impl ProbeSockets for ScriptedSockets {
        async fn open(&self, target: &BroadcastTarget) -> io::Result<UdpSocket> {
            if target.interface_name == self.refused {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "refused"));
            }
            if target.interface_name == self.no_broadcast {
                return UdpSocket::bind("0.0.0.0:0").await;
            }
            EphemeralSockets.open(target).await
        }
    }

    /// Answers every node-status query as `name`.
    async fn spawn_responder(name: &'static str) -> u16 {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = responder.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            while let Ok((len, from)) = responder.recv_from(&mut buf).await {
                let Ok(id) = netbios::parse_node_status_query(&buf[..len]) else {
                    continue;
                };
                let table = [NodeName::unique(name, SUFFIX_FILE_SERVER)];
                let reply = netbios::create_node_status_response(id, &table).unwrap();
                let _ = responder.send_to(&reply, from).await;
            }
        });
        port
    }

    fn quick_config(port: u16, timeout_ms: u64) -> ResolverConfig {
        ResolverConfig {
            port,
            timeout: Duration::from_millis(timeout_ms),
            attempts: 1,
            retry_interval: Duration::from_millis(50),
        }
    }

    #[test]
    fn later_reply_wins() {
        let mut outcome = RoundOutcome::default();
        outcome.merge(record("FILESERVER", [10, 0, 0, 5]));
        outcome.merge(record("fileserver", [10, 0, 0, 9]));

        assert_eq!(outcome.hosts.len(), 1);
        assert_eq!(outcome.hosts["FILESERVER"].address, Ipv4Addr::new(10, 0, 0, 9));
    }

    #[test]
    fn transient_errors() {
        assert!(is_transient(&io::Error::new(io::ErrorKind::ConnectionReset, "reset")));
        assert!(!is_transient(&io::Error::new(io::ErrorKind::PermissionDenied, "denied")));
    }

    #[tokio::test]
    async fn no_targets_is_empty_not_error() {
        let resolver = BroadcastResolver::new(ResolverConfig::default());
        let started = std::time::Instant::now();

        let outcome = resolver.resolve(&[]).await;

        assert!(outcome.hosts.is_empty());
        assert!(outcome.failures.is_empty());
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn latency_is_bounded_by_timeout_not_target_count() {
        // bound but silent, so probes only ever hit their deadline
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();
        let resolver = BroadcastResolver::new(quick_config(port, 300));
        let targets: Vec<BroadcastTarget> =
            (0..4).map(|i| loopback_target(&format!("if{i}"))).collect();

        let started = std::time::Instant::now();
        let outcome = resolver.resolve(&targets).await;
        let elapsed = started.elapsed();

        assert!(outcome.hosts.is_empty());
        assert!(elapsed >= Duration::from_millis(290), "finished early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(900), "probes ran serially: {elapsed:?}");
    }

    #[tokio::test]
    async fn reply_with_matching_session_is_recorded() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = responder.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, from) = responder.recv_from(&mut buf).await.unwrap();
            let id = netbios::transaction_id(&buf[..len]).unwrap();

            let stray = netbios::create_node_status_response(
                id.wrapping_add(1),
                &[NodeName::unique("STRAY", SUFFIX_FILE_SERVER)],
            )
            .unwrap();
            responder.send_to(&stray, from).await.unwrap();
            responder.send_to(b"garbage", from).await.unwrap();

            let table = [NodeName::unique("NAS", SUFFIX_FILE_SERVER)];
            let reply = netbios::create_node_status_response(id, &table).unwrap();
            responder.send_to(&reply, from).await.unwrap();
        });

        let resolver = BroadcastResolver::new(quick_config(port, 300));
        let outcome = resolver.resolve(&[loopback_target("lo")]).await;

        assert_eq!(outcome.hosts.len(), 1);
        let nas = &outcome.hosts["NAS"];
        assert_eq!(nas.address, Ipv4Addr::LOCALHOST);
        assert_eq!(nas.source, RecordSource::Broadcast { interface: "lo".into() });
    }

    #[tokio::test]
    async fn socket_open_failure_is_recorded_and_others_still_resolve() {
        let port = spawn_responder("NAS").await;
        let sockets = Arc::new(ScriptedSockets {
            refused: "bad0",
            no_broadcast: "",
        });
        let resolver = BroadcastResolver::with_sockets(quick_config(port, 300), sockets);

        let outcome = resolver
            .resolve(&[loopback_target("bad0"), loopback_target("lo")])
            .await;

        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            &outcome.failures[0],
            ProbeError::SocketOpenFailed { interface, .. } if interface == "bad0"
        ));
        assert_eq!(outcome.failures[0].interface(), "bad0");
        assert_eq!(outcome.hosts["NAS"].address, Ipv4Addr::LOCALHOST);
    }

    #[tokio::test]
    async fn socket_send_failure_is_recorded_and_others_still_resolve() {
        let port = spawn_responder("NAS").await;
        let sockets = Arc::new(ScriptedSockets {
            refused: "",
            no_broadcast: "eth9",
        });
        let resolver = BroadcastResolver::with_sockets(quick_config(port, 300), sockets);
        // without SO_BROADCAST the kernel rejects a limited-broadcast send
        let broadcast = BroadcastTarget {
            interface_name: "eth9".into(),
            broadcast_address: Ipv4Addr::BROADCAST,
        };

        let outcome = resolver.resolve(&[broadcast, loopback_target("lo")]).await;

        assert_eq!(outcome.failures.len(), 1);
        match &outcome.failures[0] {
            ProbeError::SocketSendFailed { interface, target, .. } => {
                assert_eq!(interface, "eth9");
                assert_eq!(*target, SocketAddrV4::new(Ipv4Addr::BROADCAST, port));
            }
            other => panic!("expected a send failure, got {other:?}"),
        }
        assert_eq!(outcome.hosts.len(), 1);
        assert_eq!(outcome.hosts["NAS"].address, Ipv4Addr::LOCALHOST);
    }
}
