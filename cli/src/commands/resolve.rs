use std::sync::Arc;

use colored::*;
use lanshare_common::config::Config;
use lanshare_common::network::interface::SystemInterfaces;
use lanshare_core::{
    CacheThenDns, CanonicalShareInfo, Credentials, Error, LmHosts, MountRequest, SharePath,
    canonicalize,
};

use crate::commands::{ResolveArgs, hosts};
use crate::terminal::{colors, print};

pub async fn resolve(args: &ResolveArgs, cfg: &Config) -> anyhow::Result<()> {
    // A malformed path fails before spending a round on the network.
    args.path.parse::<SharePath>().map_err(Error::from)?;

    let cache = Arc::new(LmHosts::from_config(Arc::new(SystemInterfaces), cfg));
    hosts::load(&cache, cfg).await?;

    let info: CanonicalShareInfo = if cfg.no_dns {
        canonicalize(&args.path, cache.as_ref()).await
    } else {
        canonicalize(&args.path, &CacheThenDns::new(Arc::clone(&cache))).await
    }
    .map_err(Error::from)?;

    if args.require_ip {
        info.require_server_ip()?;
    }

    if let Some(user) = &args.mount_as {
        let request = MountRequest::new(&info, info.share.clone(), credentials_for(user));
        println!("{}", serde_json::to_string_pretty(&request)?);
        return Ok(());
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    print::tree_head(0, &info.canonical);
    let server_ip: ColoredString = match info.server_ip {
        Some(ip) => ip.to_string().color(colors::IPV4_ADDR),
        None => "unresolved".color(colors::MISSING),
    };
    print::as_tree_one_level(vec![
        ("Server".to_string(), info.server.color(colors::HOSTNAME)),
        ("IPv4".to_string(), server_ip),
        ("Share".to_string(), info.share.color(colors::PRIMARY)),
        ("Path".to_string(), info.path.color(colors::TEXT_DEFAULT)),
    ]);
    Ok(())
}

/// `DOMAIN\user`, `user`, or empty for an anonymous mount.
fn credentials_for(user: &str) -> Credentials {
    if user.is_empty() {
        return Credentials::anonymous();
    }
    let (domain, user) = user.split_once('\\').unwrap_or(("", user));
    Credentials {
        domain: domain.to_string(),
        user: user.to_string(),
        ..Credentials::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_split_domain() {
        let creds = credentials_for(r"CORP\alice");
        assert_eq!(creds.domain, "CORP");
        assert_eq!(creds.user, "alice");
        assert!(!creds.save);
        assert_eq!(creds.saved_user(), r"CORP\alice");
    }

    #[test]
    fn empty_user_is_anonymous() {
        let creds = credentials_for("");
        assert!(creds.user.is_empty());
        assert!(creds.save);
    }
}
