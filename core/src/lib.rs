//! LAN host resolution for share mounting.
//!
//! [`resolver`] broadcasts NetBIOS node-status probes on every usable
//! interface, [`hosts`] keeps the resulting name table, and [`share`] turns a
//! typed share path into a resolved, canonical one.

pub mod error;
pub mod hosts;
pub mod lookup;
pub mod mount;
pub mod resolver;
pub mod share;

pub use error::{Category, Error};
pub use hosts::{LmHosts, LoadSummary};
pub use lookup::{CacheThenDns, HostnameResolver};
pub use mount::{Credentials, MountRequest};
pub use resolver::{
    BroadcastResolver, EphemeralSockets, HostRecord, ProbeError, ProbeSockets, RecordSource,
    ResolverConfig, RoundOutcome,
};
pub use share::{CanonicalShareInfo, ShareError, SharePath, canonicalize};
