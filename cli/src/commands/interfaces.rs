use anyhow::Context;
use colored::*;
use lanshare_common::config::Config;
use lanshare_common::network::interface::{
    self, EnumerationOptions, NetworkInterface, SystemInterfaces,
};

use crate::terminal::{colors, print};

pub fn interfaces(cfg: &Config) -> anyhow::Result<()> {
    let options = EnumerationOptions {
        include_loopback: cfg.include_loopback,
    };
    let interfaces: Vec<NetworkInterface> = interface::list_interfaces(&SystemInterfaces, options)
        .context("listing network interfaces")?;

    if interfaces.is_empty() {
        print::no_results("no interface can carry a broadcast probe");
        return Ok(());
    }

    for (idx, iface) in interfaces.iter().enumerate() {
        print::tree_head(idx, &iface.name);
        let broadcast: ColoredString = match iface.broadcast_target() {
            Ok(target) => target.broadcast_address.to_string().color(colors::IPV4_ADDR),
            Err(err) => err.to_string().color(colors::MISSING),
        };
        print::as_tree_one_level(vec![
            ("Address".to_string(), print::ipv4_with_prefix(iface.address, iface.prefix_length)),
            ("Broadcast".to_string(), broadcast),
        ]);
    }
    print::print_status(format!("{} usable interface(s)", interfaces.len()));
    Ok(())
}
