//! Strategies for turning a server name into an address.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::hosts::LmHosts;

/// Resolves a server name to an IPv4 address, `None` when unknown.
#[async_trait]
pub trait HostnameResolver: Send + Sync {
    async fn resolve_hostname(&self, hostname: &str) -> Option<Ipv4Addr>;
}

/// Cache only, never touches the network.
#[async_trait]
impl HostnameResolver for LmHosts {
    async fn resolve_hostname(&self, hostname: &str) -> Option<Ipv4Addr> {
        self.lookup(hostname)
    }
}

/// A caller-supplied table, matched case-insensitively.
#[async_trait]
impl HostnameResolver for HashMap<String, Ipv4Addr> {
    async fn resolve_hostname(&self, hostname: &str) -> Option<Ipv4Addr> {
        self.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(hostname))
            .map(|(_, ip)| *ip)
    }
}

/// The broadcast cache first, then the system resolver.
pub struct CacheThenDns {
    hosts: Arc<LmHosts>,
}

impl CacheThenDns {
    pub fn new(hosts: Arc<LmHosts>) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl HostnameResolver for CacheThenDns {
    async fn resolve_hostname(&self, hostname: &str) -> Option<Ipv4Addr> {
        if let Some(ip) = self.hosts.lookup(hostname) {
            return Some(ip);
        }

        debug!("{hostname} not in lmHosts, asking the system resolver");
        match tokio::net::lookup_host((hostname, 0)).await {
            Ok(addrs) => addrs
                .map(|addr| addr.ip())
                .find_map(|ip| match ip {
                    IpAddr::V4(v4) => Some(v4),
                    IpAddr::V6(_) => None,
                }),
            Err(err) => {
                debug!("system lookup for {hostname} failed: {err}");
                None
            }
        }
    }
}
