use std::time::Duration;

/// Well-known NetBIOS Name Service port.
pub const NETBIOS_NS_PORT: u16 = 137;

pub struct Config {
    /// How long each probe listens for replies.
    pub timeout: Duration,
    /// Destination port of the resolution probes.
    pub port: u16,
    /// Number of query datagrams sent per probe.
    pub attempts: u8,
    /// Delay between repeated query datagrams.
    pub retry_interval: Duration,
    /// Probe loopback interfaces as well.
    pub include_loopback: bool,
    /// Skips the system DNS fallback when a host is not in the cache.
    pub no_dns: bool,
    /// Output verbosity reduction, 0 prints everything.
    pub quiet: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            port: NETBIOS_NS_PORT,
            attempts: 2,
            retry_interval: Duration::from_millis(250),
            include_loopback: false,
            no_dns: false,
            quiet: 0,
        }
    }
}
