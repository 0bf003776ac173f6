//! # Interface Enumeration
//!
//! Lists the local interfaces a resolution round can broadcast on.
//!
//! Platforms report one entry per assigned address, so the same interface
//! name routinely appears several times (an IPv6 link-local entry followed by
//! the IPv4 one, for example). Enumeration keeps the first entry per name
//! that yields a broadcast address and drops the rest.

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use pnet::datalink;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::network::broadcast::{self, AddressError};

/// One address of one local interface, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub address: IpAddr,
    pub prefix_length: u8,
}

/// Where a probe for one interface is sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastTarget {
    pub interface_name: String,
    pub broadcast_address: Ipv4Addr,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("platform interface query failed: {0}")]
    PlatformQueryFailed(String),
}

/// Why a reported interface entry was not used.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ViabilityError {
    /// Loopback entries are skipped unless explicitly allowed.
    IsLoopback,
    /// The address/prefix pair has no IPv4 broadcast address.
    NoBroadcast(AddressError),
}

impl fmt::Display for ViabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IsLoopback => write!(f, "loopback interface"),
            Self::NoBroadcast(err) => write!(f, "{err}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EnumerationOptions {
    /// Probe loopback interfaces too. Only useful against a local responder.
    pub include_loopback: bool,
}

/// The platform query behind enumeration.
///
/// Implementations may return duplicate names and may fail wholesale.
pub trait InterfaceSource: Send + Sync {
    fn query(&self) -> Result<Vec<NetworkInterface>, InterfaceError>;
}

/// Reads the host's interfaces through `pnet::datalink`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn query(&self) -> Result<Vec<NetworkInterface>, InterfaceError> {
        let reported: Vec<datalink::NetworkInterface> = datalink::interfaces();
        debug!("platform reported {} interface(s)", reported.len());
        Ok(reported.iter().flat_map(flatten).collect())
    }
}

impl NetworkInterface {
    pub fn new(name: impl Into<String>, address: IpAddr, prefix_length: u8) -> Self {
        Self {
            name: name.into(),
            address,
            prefix_length,
        }
    }

    pub fn broadcast_target(&self) -> Result<BroadcastTarget, AddressError> {
        let broadcast_address =
            broadcast::compute_broadcast_address(self.address, self.prefix_length)?;
        Ok(BroadcastTarget {
            interface_name: self.name.clone(),
            broadcast_address,
        })
    }
}

impl fmt::Display for NetworkInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.name, self.address, self.prefix_length)
    }
}

/// Lists usable interfaces, one entry per name.
///
/// Fails only when the platform query fails; unusable entries are logged
/// and skipped.
pub fn list_interfaces(
    source: &dyn InterfaceSource,
    options: EnumerationOptions,
) -> Result<Vec<NetworkInterface>, InterfaceError> {
    Ok(viable_interfaces(source, options)?
        .into_iter()
        .map(|(iface, _)| iface)
        .collect())
}

/// Lists one broadcast target per usable interface.
pub fn broadcast_targets(
    source: &dyn InterfaceSource,
    options: EnumerationOptions,
) -> Result<Vec<BroadcastTarget>, InterfaceError> {
    Ok(viable_interfaces(source, options)?
        .into_iter()
        .map(|(_, target)| target)
        .collect())
}

/// First viable entry per name, with the target its viability check built.
fn viable_interfaces(
    source: &dyn InterfaceSource,
    options: EnumerationOptions,
) -> Result<Vec<(NetworkInterface, BroadcastTarget)>, InterfaceError> {
    let reported: Vec<NetworkInterface> = source.query()?;
    let mut seen_interfaces: HashSet<String> = HashSet::new();
    let mut viable: Vec<(NetworkInterface, BroadcastTarget)> = Vec::new();

    for iface in reported {
        if seen_interfaces.contains(&iface.name) {
            continue;
        }
        match is_viable_interface(&iface, options) {
            Ok(target) => {
                debug!("using {iface}");
                seen_interfaces.insert(iface.name.clone());
                viable.push((iface, target));
            }
            Err(reason) => debug!("skipping {iface}: {reason}"),
        }
    }

    Ok(viable)
}

fn is_viable_interface(
    iface: &NetworkInterface,
    options: EnumerationOptions,
) -> Result<BroadcastTarget, ViabilityError> {
    if iface.address.is_loopback() && !options.include_loopback {
        return Err(ViabilityError::IsLoopback);
    }
    iface.broadcast_target().map_err(ViabilityError::NoBroadcast)
}

/// Splits a pnet interface into one entry per address. Down interfaces
/// contribute nothing.
fn flatten(iface: &datalink::NetworkInterface) -> Vec<NetworkInterface> {
    if !iface.is_up() {
        return Vec::new();
    }
    iface
        .ips
        .iter()
        .map(|net| NetworkInterface::new(iface.name.clone(), net.ip(), net.prefix()))
        .collect()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
