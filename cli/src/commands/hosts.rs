use std::sync::Arc;
use std::time::{Duration, SystemTime};

use colored::*;
use lanshare_common::config::Config;
use lanshare_common::network::interface::SystemInterfaces;
use lanshare_core::{Error, HostRecord, LmHosts, LoadSummary, RecordSource};
use tracing::warn;

use crate::terminal::{colors, print, spinner};

pub async fn hosts(cfg: &Config, json: bool) -> anyhow::Result<()> {
    let hosts = LmHosts::from_config(Arc::new(SystemInterfaces), cfg);
    let summary: LoadSummary = load(&hosts, cfg).await?;
    let records: Vec<HostRecord> = hosts.records();

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        print::no_results("no host answered the broadcast");
    }
    for (idx, record) in records.iter().enumerate() {
        print::tree_head(idx, &record.hostname);
        print::as_tree_one_level(record_lines(record));
    }
    report_summary(&summary, cfg.quiet);
    Ok(())
}

/// Runs one lmHosts round behind the spinner.
pub async fn load(hosts: &LmHosts, cfg: &Config) -> Result<LoadSummary, Error> {
    if cfg.quiet == 0 {
        spinner::report_probe_progress(cfg.timeout);
    }
    let result = hosts.load().await;
    if let Some(handle) = spinner::SPINNER.get() {
        handle.finish_and_clear();
    }
    result.map_err(Error::from)
}

fn record_lines(record: &HostRecord) -> Vec<(String, ColoredString)> {
    let mut lines: Vec<(String, ColoredString)> = vec![(
        "IPv4".to_string(),
        record.address.to_string().color(colors::IPV4_ADDR),
    )];

    let aliases: Vec<&str> = record
        .names
        .iter()
        .map(String::as_str)
        .filter(|name| !name.eq_ignore_ascii_case(&record.hostname))
        .collect();
    if !aliases.is_empty() {
        lines.push(("Names".to_string(), aliases.join(", ").color(colors::HOSTNAME)));
    }

    let via: String = match &record.source {
        RecordSource::Broadcast { interface } => interface.clone(),
        RecordSource::Seeded => "seeded".to_string(),
    };
    lines.push(("Via".to_string(), via.color(colors::TEXT_DEFAULT)));

    let age: Duration = SystemTime::now()
        .duration_since(record.last_seen)
        .unwrap_or_default();
    lines.push(("Seen".to_string(), format!("{}ms ago", age.as_millis()).dimmed()));
    lines
}

fn report_summary(summary: &LoadSummary, q_level: u8) {
    if summary.failed_probes > 0 {
        warn!("{} probe(s) could not be sent", summary.failed_probes);
    }
    if q_level > 0 {
        return;
    }
    print::print_status(format!(
        "{} host(s) on {} interface(s)",
        summary.hosts, summary.interfaces
    ));
}
