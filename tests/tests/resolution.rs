use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lanshare_common::network::interface::NetworkInterface;
use lanshare_core::{LmHosts, RecordSource, canonicalize};
use lanshare_integration_tests::{loopback_config, loopback_host, FixedInterfaces, Responder};

const TIMEOUT: Duration = Duration::from_millis(400);

fn cache_for(interfaces: Vec<NetworkInterface>, port: u16) -> Arc<LmHosts> {
    Arc::new(LmHosts::from_config(
        Arc::new(FixedInterfaces(interfaces)),
        &loopback_config(port, TIMEOUT),
    ))
}

#[tokio::test]
async fn load_discovers_loopback_responder() {
    let responder = Responder::spawn(Ipv4Addr::LOCALHOST, 0, "FileServer", Duration::ZERO)
        .await
        .unwrap();
    let hosts = cache_for(vec![loopback_host("lo", Ipv4Addr::LOCALHOST)], responder.port());

    let summary = hosts.load().await.unwrap();

    assert_eq!(summary.interfaces, 1);
    assert_eq!(summary.hosts, 1);
    assert_eq!(hosts.lookup("fileserver"), Some(Ipv4Addr::LOCALHOST));

    let record = &hosts.records()[0];
    assert_eq!(record.hostname, "FILESERVER");
    assert_eq!(record.source, RecordSource::Broadcast { interface: "lo".into() });
}

#[tokio::test]
async fn canonicalize_uses_loaded_hosts() {
    let responder = Responder::spawn(Ipv4Addr::LOCALHOST, 0, "FileServer", Duration::ZERO)
        .await
        .unwrap();
    let hosts = cache_for(vec![loopback_host("lo", Ipv4Addr::LOCALHOST)], responder.port());
    hosts.load().await.unwrap();

    let info = canonicalize(r"\\FileServer\Shared\docs", hosts.as_ref()).await.unwrap();

    assert_eq!(info.server, "FileServer");
    assert_eq!(info.share, "Shared");
    assert_eq!(info.path, "docs");
    assert_eq!(info.server_ip, Some(Ipv4Addr::LOCALHOST));
    assert_eq!(info.canonical, r"\\FileServer\Shared\docs");
}

#[tokio::test]
async fn loopback_is_skipped_unless_asked_for() {
    let responder = Responder::spawn(Ipv4Addr::LOCALHOST, 0, "FileServer", Duration::ZERO)
        .await
        .unwrap();
    let cfg = lanshare_common::config::Config {
        include_loopback: false,
        ..loopback_config(responder.port(), TIMEOUT)
    };
    let hosts = LmHosts::from_config(
        Arc::new(FixedInterfaces(vec![loopback_host("lo", Ipv4Addr::LOCALHOST)])),
        &cfg,
    );

    let summary = hosts.load().await.unwrap();

    assert_eq!(summary.interfaces, 0);
    assert!(hosts.is_empty());
    assert_eq!(responder.queries(), 0);
}

#[tokio::test]
async fn concurrent_loads_send_one_round_of_probes() {
    let responder = Responder::spawn(Ipv4Addr::LOCALHOST, 0, "FileServer", Duration::ZERO)
        .await
        .unwrap();
    let hosts = cache_for(vec![loopback_host("lo", Ipv4Addr::LOCALHOST)], responder.port());

    let (a, b, c) = tokio::join!(hosts.load(), hosts.load(), hosts.load());

    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(a.unwrap().hosts, 1);
    assert_eq!(responder.queries(), 1);
    assert_eq!(hosts.len(), 1);
}

#[tokio::test]
async fn silent_network_ends_at_the_deadline() {
    // Bound but never answering.
    let silent = tokio::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = silent.local_addr().unwrap().port();
    let hosts = cache_for(vec![loopback_host("lo", Ipv4Addr::LOCALHOST)], port);

    let started = Instant::now();
    let summary = hosts.load().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.hosts, 0);
    assert!(elapsed >= TIMEOUT - Duration::from_millis(20), "returned after {elapsed:?}");
    assert!(elapsed < TIMEOUT * 3, "returned after {elapsed:?}");
}

// The whole of 127.0.0.0/8 is routed to lo on Linux, so two responders can
// share a port on different source addresses.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn later_reply_overwrites_earlier_one() {
    let first = Responder::spawn(Ipv4Addr::LOCALHOST, 0, "FileServer", Duration::ZERO)
        .await
        .unwrap();
    let second_addr = Ipv4Addr::new(127, 0, 0, 2);
    let delay = Duration::from_millis(150);
    let second = Responder::spawn(second_addr, first.port(), "FileServer", delay)
        .await
        .unwrap();

    let hosts = cache_for(
        vec![
            loopback_host("lo", Ipv4Addr::LOCALHOST),
            loopback_host("lo:1", second_addr),
        ],
        first.port(),
    );
    let summary = hosts.load().await.unwrap();

    assert_eq!(summary.interfaces, 2);
    assert_eq!(summary.hosts, 1);
    assert_eq!(hosts.lookup("FILESERVER"), Some(second_addr));
    assert_eq!(second.queries(), 1);
}
