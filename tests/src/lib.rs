//! Loopback fixtures: a scripted interface list and NetBIOS responders that
//! answer on 127.0.0.0/8.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lanshare_common::config::Config;
use lanshare_common::network::interface::{InterfaceError, InterfaceSource, NetworkInterface};
use lanshare_protocols::netbios::{self, NodeName, SUFFIX_FILE_SERVER, SUFFIX_WORKSTATION};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Returns the same interfaces on every query.
pub struct FixedInterfaces(pub Vec<NetworkInterface>);

impl InterfaceSource for FixedInterfaces {
    fn query(&self) -> Result<Vec<NetworkInterface>, InterfaceError> {
        Ok(self.0.clone())
    }
}

/// A /32 loopback "interface": its broadcast address is the host itself, so
/// probes reach a responder bound to `address`.
pub fn loopback_host(name: &str, address: Ipv4Addr) -> NetworkInterface {
    NetworkInterface::new(name, IpAddr::V4(address), 32)
}

/// Probing config for loopback fixtures.
pub fn loopback_config(port: u16, timeout: Duration) -> Config {
    Config {
        timeout,
        port,
        attempts: 1,
        include_loopback: true,
        ..Config::default()
    }
}

/// Answers node-status queries as `name` until dropped.
pub struct Responder {
    pub addr: SocketAddr,
    queries: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl Responder {
    pub async fn spawn(
        bind: Ipv4Addr,
        port: u16,
        name: &str,
        delay: Duration,
    ) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind((bind, port)).await?;
        let addr: SocketAddr = socket.local_addr()?;
        let table: Vec<NodeName> = vec![
            NodeName::unique(name, SUFFIX_WORKSTATION),
            NodeName::unique(name, SUFFIX_FILE_SERVER),
            NodeName::group("WORKGROUP", SUFFIX_WORKSTATION),
        ];
        let queries = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&queries);

        let task = tokio::spawn(async move {
            let mut buf = [0u8; 1500];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                let Ok(id) = netbios::parse_node_status_query(&buf[..len]) else {
                    continue;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                if let Ok(reply) = netbios::create_node_status_response(id, &table) {
                    let _ = socket.send_to(&reply, from).await;
                }
            }
        });

        Ok(Self { addr, queries, task })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Node-status queries received so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.task.abort();
    }
}
