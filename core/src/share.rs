//! # Share Path Canonicalization
//!
//! Turns what a user typed into the `{server, share, path, serverIP,
//! canonical}` shape the mount collaborator expects.
//!
//! Accepted spellings:
//! * `\\server\share\sub\dir`
//! * `//server/share/sub/dir`
//! * `smb://server/share/sub/dir`
//!
//! Separators may be mixed, repeated or trailing. Server and share keep the
//! case they were typed in; the canonical form always uses backslashes.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

use crate::lookup::HostnameResolver;

const SMB_SCHEME: &str = "smb://";
const SEPARATORS: [char; 2] = ['\\', '/'];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShareError {
    #[error("malformed share path {path:?}: {reason}")]
    MalformedPath { path: String, reason: &'static str },
}

/// A parsed, not yet resolved, share path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePath {
    pub server: String,
    pub share: String,
    pub segments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalShareInfo {
    pub server: String,
    pub path: String,
    pub share: String,
    /// Empty when the server name could not be resolved.
    #[serde(rename = "serverIP", serialize_with = "ip_or_empty")]
    pub server_ip: Option<Ipv4Addr>,
    pub canonical: String,
}

impl FromStr for SharePath {
    type Err = ShareError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &'static str| ShareError::MalformedPath {
            path: raw.to_string(),
            reason,
        };

        let trimmed: &str = raw.trim();
        let rest: &str =
            strip_root(trimmed).ok_or_else(|| malformed("expected \\\\server\\share"))?;

        let mut segments = rest.split(SEPARATORS).filter(|s| !s.is_empty()).map(str::to_string);
        let server: String = segments.next().ok_or_else(|| malformed("missing server"))?;
        let share: String = segments.next().ok_or_else(|| malformed("missing share"))?;

        Ok(Self {
            server,
            share,
            segments: segments.collect(),
        })
    }
}

impl SharePath {
    /// Sub-path below the share, backslash separated, empty at the share root.
    pub fn sub_path(&self) -> String {
        self.segments.join("\\")
    }

    pub fn canonical(&self) -> String {
        let mut canonical = format!("\\\\{}\\{}", self.server, self.share);
        for segment in &self.segments {
            canonical.push('\\');
            canonical.push_str(segment);
        }
        canonical
    }
}

impl fmt::Display for SharePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl CanonicalShareInfo {
    /// For callers that cannot mount without an address.
    pub fn require_server_ip(&self) -> Result<Ipv4Addr, crate::Error> {
        self.server_ip
            .ok_or_else(|| crate::Error::HostNotFound(self.server.clone()))
    }
}

/// Parses `raw_path` and resolves its server.
///
/// An IPv4 literal server is used as is. An unresolvable server still yields
/// a result, with `server_ip` empty.
pub async fn canonicalize<R>(raw_path: &str, resolver: &R) -> Result<CanonicalShareInfo, ShareError>
where
    R: HostnameResolver + ?Sized,
{
    let parsed: SharePath = raw_path.parse()?;

    let server_ip: Option<Ipv4Addr> = match parsed.server.parse::<Ipv4Addr>() {
        Ok(literal) => Some(literal),
        Err(_) => resolver.resolve_hostname(&parsed.server).await,
    };
    if server_ip.is_none() {
        debug!("could not resolve {}", parsed.server);
    }

    Ok(CanonicalShareInfo {
        canonical: parsed.canonical(),
        path: parsed.sub_path(),
        server: parsed.server,
        share: parsed.share,
        server_ip,
    })
}

fn strip_root(path: &str) -> Option<&str> {
    if path
        .get(..SMB_SCHEME.len())
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case(SMB_SCHEME))
    {
        return Some(&path[SMB_SCHEME.len()..]);
    }
    let mut chars = path.chars();
    match (chars.next(), chars.next()) {
        (Some(a), Some(b)) if SEPARATORS.contains(&a) && SEPARATORS.contains(&b) => {
            Some(&path[2..])
        }
        _ => None,
    }
}

fn ip_or_empty<S: Serializer>(ip: &Option<Ipv4Addr>, serializer: S) -> Result<S::Ok, S::Error> {
    match ip {
        Some(ip) => serializer.collect_str(ip),
        None => serializer.serialize_str(""),
    }
}
