//! The request handed to the external mount collaborator.
//!
//! Nothing here mounts anything; it only packs a canonicalized share and the
//! user's credentials into the shape the collaborator consumes.

use std::fmt;

use serde::Serialize;

use crate::share::CanonicalShareInfo;

#[derive(Clone, Default)]
pub struct Credentials {
    pub domain: String,
    pub user: String,
    pub password: String,
    /// Whether the collaborator may remember these credentials.
    pub save: bool,
}

impl Credentials {
    /// No user, no password. Nothing secret, so saving is allowed.
    pub fn anonymous() -> Self {
        Self {
            save: true,
            ..Self::default()
        }
    }

    /// `DOMAIN\user`, or just `user` without a domain.
    pub fn saved_user(&self) -> String {
        if self.domain.is_empty() {
            self.user.clone()
        } else {
            format!("{}\\{}", self.domain, self.user)
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("domain", &self.domain)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("save", &self.save)
            .finish()
    }
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountRequest {
    pub share_path: String,
    pub display_name: String,
    pub domain: String,
    pub user: String,
    pub password: String,
    pub server: String,
    pub path: String,
    pub share: String,
    #[serde(rename = "serverIP")]
    pub server_ip: String,
    pub save_credentials: bool,
}

impl MountRequest {
    pub fn new(
        info: &CanonicalShareInfo,
        display_name: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            share_path: info.canonical.clone(),
            display_name: display_name.into(),
            domain: credentials.domain,
            user: credentials.user,
            password: credentials.password,
            server: info.server.clone(),
            path: info.path.clone(),
            share: info.share.clone(),
            server_ip: info.server_ip.map(|ip| ip.to_string()).unwrap_or_default(),
            save_credentials: credentials.save,
        }
    }
}

impl fmt::Debug for MountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountRequest")
            .field("share_path", &self.share_path)
            .field("user", &self.user)
            .field("server_ip", &self.server_ip)
            .finish_non_exhaustive()
    }
}
