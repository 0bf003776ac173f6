//! # Host Cache (lmHosts)
//!
//! The session's hostname → address table.
//!
//! [`LmHosts::load`] runs a resolution round and merges its records; callers
//! that arrive while a round is in flight wait for that round instead of
//! starting another. [`LmHosts::lookup`] only reads the table and never
//! touches the network.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use lanshare_common::config::Config;
use lanshare_common::network::interface::{
    self, BroadcastTarget, EnumerationOptions, InterfaceError, InterfaceSource,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::resolver::{BroadcastResolver, HostRecord, ResolverConfig, RoundOutcome, host_key};

/// What one `load()` round did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Interfaces probed.
    pub interfaces: usize,
    /// Hosts that answered this round.
    pub hosts: usize,
    /// Probes that could not open or send.
    pub failed_probes: usize,
}

type LoadOutcome = Result<LoadSummary, InterfaceError>;

pub struct LmHosts {
    source: Arc<dyn InterfaceSource>,
    options: EnumerationOptions,
    resolver: BroadcastResolver,
    records: RwLock<HashMap<String, HostRecord>>,
    /// Held for the whole of a round; keeps the outcome of the last one.
    round: Mutex<Option<LoadOutcome>>,
    /// Bumped when a round completes.
    generation: AtomicU64,
}

impl LmHosts {
    pub fn new(
        source: Arc<dyn InterfaceSource>,
        options: EnumerationOptions,
        resolver: BroadcastResolver,
    ) -> Self {
        Self {
            source,
            options,
            resolver,
            records: RwLock::new(HashMap::new()),
            round: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_config(source: Arc<dyn InterfaceSource>, cfg: &Config) -> Self {
        let options = EnumerationOptions {
            include_loopback: cfg.include_loopback,
        };
        Self::new(source, options, BroadcastResolver::new(ResolverConfig::from(cfg)))
    }

    /// Runs a resolution round and installs its records.
    ///
    /// Concurrent callers share one round and all receive its summary. Only a
    /// failing interface query makes this fail; dead probes just mean fewer
    /// hosts.
    pub async fn load(&self) -> Result<LoadSummary, InterfaceError> {
        let observed: u64 = self.generation.load(Ordering::Acquire);
        let mut last = self.round.lock().await;

        if self.generation.load(Ordering::Acquire) != observed
            && let Some(outcome) = last.as_ref()
        {
            debug!("joined an in-flight lmHosts round");
            return outcome.clone();
        }

        let outcome: LoadOutcome = self.run_round().await;
        *last = Some(outcome.clone());
        self.generation.fetch_add(1, Ordering::Release);
        outcome
    }

    async fn run_round(&self) -> LoadOutcome {
        let source = Arc::clone(&self.source);
        let options = self.options;
        let targets: Vec<BroadcastTarget> = tokio::task::spawn_blocking(move || {
            interface::broadcast_targets(source.as_ref(), options)
        })
        .await
        .map_err(|err| InterfaceError::PlatformQueryFailed(err.to_string()))??;

        info!("probing {} interface(s)", targets.len());
        let outcome: RoundOutcome = self.resolver.resolve(&targets).await;

        let summary = LoadSummary {
            interfaces: targets.len(),
            hosts: outcome.hosts.len(),
            failed_probes: outcome.failures.len(),
        };
        self.install(outcome.hosts.into_values());
        Ok(summary)
    }

    fn install(&self, records: impl IntoIterator<Item = HostRecord>) {
        let mut table = self.records.write().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            if let Some(old) = table.get(&record.key())
                && old.address != record.address
            {
                debug!("{} moved from {} to {}", record.hostname, old.address, record.address);
            }
            table.insert(record.key(), record);
        }
    }

    /// Installs a caller-supplied map, e.g. hosts learned from a directory
    /// service. Entries overwrite discovered ones with the same name.
    pub fn seed<I, S>(&self, hosts: I)
    where
        I: IntoIterator<Item = (S, Ipv4Addr)>,
        S: Into<String>,
    {
        self.install(hosts.into_iter().map(|(name, ip)| HostRecord::seeded(name, ip)));
    }

    /// Case-insensitive lookup against the current table.
    pub fn lookup(&self, hostname: &str) -> Option<Ipv4Addr> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&host_key(hostname))
            .map(|record| record.address)
    }

    /// Hostname → address, with names as the hosts reported them.
    pub fn host_ip_map(&self) -> HashMap<String, Ipv4Addr> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|record| (record.hostname.clone(), record.address))
            .collect()
    }

    /// Snapshot of every record, sorted by hostname.
    pub fn records(&self) -> Vec<HostRecord> {
        let mut records: Vec<HostRecord> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| a.key().cmp(&b.key()));
        records
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
