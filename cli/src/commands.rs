pub mod hosts;
pub mod interfaces;
pub mod resolve;
pub mod respond;

use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use lanshare_common::config::{Config, NETBIOS_NS_PORT};

#[derive(Parser)]
#[command(name = "lanshare")]
#[command(about = "Resolve LAN hosts and share paths over NetBIOS broadcast.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub probe: ProbeArgs,

    /// Reduce output (repeat for less)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub quiet: u8,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Args)]
pub struct ProbeArgs {
    /// How long each probe listens for replies
    #[arg(long, global = true, value_name = "MS", default_value_t = 2000)]
    pub timeout_ms: u64,

    /// UDP port probes are sent to, or answered on by `respond`
    #[arg(long, global = true, default_value_t = NETBIOS_NS_PORT)]
    pub port: u16,

    /// Query datagrams sent per interface
    #[arg(
        long,
        global = true,
        default_value_t = 2,
        value_parser = clap::value_parser!(u8).range(1..)
    )]
    pub attempts: u8,

    /// Probe loopback interfaces as well
    #[arg(long, global = true)]
    pub include_loopback: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the interfaces probes would be broadcast on
    #[command(alias = "i")]
    Interfaces,
    /// Probe the local networks and print every host that answered
    #[command(alias = "h")]
    Hosts {
        /// Print the host table as JSON
        #[arg(long)]
        json: bool,
    },
    /// Canonicalize a share path and resolve its server
    #[command(alias = "r")]
    Resolve(ResolveArgs),
    /// Answer node status queries, for testing on a network without SMB hosts
    Respond(RespondArgs),
}

#[derive(Args)]
pub struct ResolveArgs {
    /// \\server\share\path, //server/share/path or smb://server/share/path
    pub path: String,

    /// Only use hosts that answered the broadcast
    #[arg(long)]
    pub no_dns: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Fail when the server has no address
    #[arg(long)]
    pub require_ip: bool,

    /// Print the mount request instead, as DOMAIN\user (anonymous if omitted)
    #[arg(long, value_name = "USER", num_args = 0..=1, default_missing_value = "")]
    pub mount_as: Option<String>,
}

#[derive(Args)]
pub struct RespondArgs {
    /// Name to announce, at most 15 characters
    #[arg(long)]
    pub name: String,

    /// Workgroup to announce alongside the name
    #[arg(long, default_value = "WORKGROUP")]
    pub workgroup: String,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: std::net::Ipv4Addr,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn to_config(&self) -> Config {
        let no_dns: bool = match &self.command {
            Commands::Resolve(args) => args.no_dns,
            _ => false,
        };
        Config {
            timeout: Duration::from_millis(self.probe.timeout_ms),
            port: self.probe.port,
            attempts: self.probe.attempts,
            include_loopback: self.probe.include_loopback,
            no_dns,
            quiet: self.quiet,
            ..Config::default()
        }
    }
}
