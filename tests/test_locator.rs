mod support;

use rssdp::locator::{LocatorEvent, SsdpDeviceLocator};
use rssdp::logging::NullLogger;
use rssdp::runtime::config::{LocatorConfig, TransportConfig};
use rssdp::transport::{Endpoint, SsdpCommunicationsServer};
use rssdp::SsdpError;
use std::sync::Arc;
use std::time::Duration;
use support::{settle, MockNetwork, GROUP};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;

struct Fixture {
    network: MockNetwork,
    comms: Arc<SsdpCommunicationsServer>,
    locator: Arc<SsdpDeviceLocator>,
    remote: Endpoint,
}

fn fixture() -> Fixture {
    let network = MockNetwork::new();
    let comms = Arc::new(
        SsdpCommunicationsServer::new(network.node(2), TransportConfig::default(), NullLogger::new()).unwrap(),
    );
    let locator = SsdpDeviceLocator::new(comms.clone(), LocatorConfig::default(), NullLogger::new()).unwrap();
    let remote = network.node(9).endpoint(4000);
    Fixture {
        network,
        comms,
        locator: Arc::new(locator),
        remote,
    }
}

fn drain(events: &mut UnboundedReceiver<LocatorEvent>) -> Vec<LocatorEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

impl Fixture {
    fn alive(&self, nt: &str, usn: &str, max_age: u64) {
        self.network.send(
            self.remote,
            GROUP,
            &support::alive_text(nt, usn, "http://10.0.0.9:4000/desc.xml", max_age),
        );
    }

    fn byebye(&self, nt: &str, usn: &str) {
        self.network.send(self.remote, GROUP, &support::byebye_text(nt, usn));
    }

    fn respond(&self, st: &str, usn: &str) {
        let to = self.comms.local_endpoint().unwrap();
        self.network.send(
            self.remote,
            to,
            &support::response_text(st, usn, "http://10.0.0.9:4000/desc.xml", 1800),
        );
    }

    fn spawn_search(&self, st: &'static str, wait: Duration) -> tokio::task::JoinHandle<rssdp::Result<Vec<rssdp::DiscoveredDevice>>> {
        let locator = self.locator.clone();
        tokio::spawn(async move { locator.search_with(st, wait).await })
    }
}

#[tokio::test(start_paused = true)]
async fn test_alive_adds_then_updates() {
    let f = fixture();
    let mut events = f.locator.subscribe();
    f.locator.start_listening_for_notifications().unwrap();
    assert!(f.locator.is_listening());

    f.alive("upnp:rootdevice", "uuid:A::upnp:rootdevice", 1800);
    settle().await;
    f.alive("upnp:rootdevice", "uuid:A::upnp:rootdevice", 900);
    settle().await;

    let seen = drain(&mut events);
    assert_eq!(seen.len(), 2);
    assert!(matches!(&seen[0], LocatorEvent::DeviceAvailable { is_new_device: true, device } if device.usn == "uuid:A::upnp:rootdevice"));
    assert!(matches!(&seen[1], LocatorEvent::DeviceAvailable { is_new_device: false, .. }));

    let cached = f.locator.cached_devices();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].cache_lifetime, Duration::from_secs(900));
    assert_eq!(cached[0].description_location.as_ref().unwrap().as_str(), "http://10.0.0.9:4000/desc.xml");
    assert_eq!(cached[0].notification_type, "upnp:rootdevice");
}

#[tokio::test(start_paused = true)]
async fn test_byebye_removes_known_device() {
    let f = fixture();
    let mut events = f.locator.subscribe();
    f.locator.start_listening_for_notifications().unwrap();

    f.alive("uuid:A", "uuid:A", 1800);
    settle().await;
    f.byebye("uuid:A", "uuid:A");
    settle().await;

    let seen = drain(&mut events);
    assert!(matches!(&seen[1], LocatorEvent::DeviceUnavailable { expired: false, device } if device.usn == "uuid:A"));
    assert!(f.locator.cached_devices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_byebye_for_unknown_device_still_raises() {
    let f = fixture();
    let mut events = f.locator.subscribe();
    f.locator.start_listening_for_notifications().unwrap();

    f.byebye("upnp:rootdevice", "uuid:Z::upnp:rootdevice");
    settle().await;

    let seen = drain(&mut events);
    assert_eq!(seen.len(), 1);
    match &seen[0] {
        LocatorEvent::DeviceUnavailable { device, expired } => {
            assert!(!expired);
            assert_eq!(device.usn, "uuid:Z::upnp:rootdevice");
            assert_eq!(device.notification_type, "upnp:rootdevice");
            assert!(device.description_location.is_none());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_filter_and_missing_location() {
    let f = fixture();
    let mut events = f.locator.subscribe();
    f.locator.set_notification_filter(Some("upnp:rootdevice".to_string()));
    f.locator.start_listening_for_notifications().unwrap();

    f.alive("uuid:A", "uuid:A", 1800);
    f.byebye("uuid:B", "uuid:B");
    f.network.send(
        f.remote,
        GROUP,
        &support::alive_text("upnp:rootdevice", "uuid:C::upnp:rootdevice", "", 1800),
    );
    f.alive("upnp:rootdevice", "uuid:D::upnp:rootdevice", 1800);
    settle().await;

    let seen = drain(&mut events);
    assert_eq!(seen.len(), 1);
    assert!(matches!(&seen[0], LocatorEvent::DeviceAvailable { device, .. } if device.usn == "uuid:D::upnp:rootdevice"));
    assert_eq!(f.locator.notification_filter().as_deref(), Some("upnp:rootdevice"));
}

#[tokio::test(start_paused = true)]
async fn test_notifications_ignored_when_not_listening() {
    let f = fixture();
    let mut events = f.locator.subscribe();
    f.comms.begin_listening_for_broadcasts().unwrap();

    f.alive("uuid:A", "uuid:A", 1800);
    settle().await;
    assert!(drain(&mut events).is_empty());

    f.locator.start_listening_for_notifications().unwrap();
    f.locator.stop_listening_for_notifications().unwrap();
    assert!(!f.locator.is_listening());
    assert!(f.comms.is_listening_for_broadcasts());
    f.alive("uuid:A", "uuid:A", 1800);
    settle().await;
    assert!(drain(&mut events).is_empty());
    assert!(f.locator.cached_devices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_zero_wait_search_uses_cache_only() {
    let f = fixture();
    f.locator.start_listening_for_notifications().unwrap();
    f.alive("uuid:A", "uuid:A", 1800);
    settle().await;

    let mut events = f.locator.subscribe();
    f.network.clear_sent();
    let found = f.locator.search_with("ssdp:all", Duration::ZERO).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].usn, "uuid:A");
    assert!(f.network.sent().iter().all(|d| !d.is_search()));
    assert!(matches!(&drain(&mut events)[..], [LocatorEvent::DeviceAvailable { is_new_device: false, .. }]));
    assert!(!f.locator.is_searching());
}

#[tokio::test(start_paused = true)]
async fn test_search_argument_checks() {
    let f = fixture();
    assert!(matches!(
        f.locator.search_with("ssdp:all", Duration::from_millis(500)).await,
        Err(SsdpError::Argument(_))
    ));
    assert!(matches!(
        f.locator.search_with("  ", Duration::from_secs(2)).await,
        Err(SsdpError::Argument(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_search_is_rejected() {
    let f = fixture();
    let first = f.spawn_search("ssdp:all", Duration::from_secs(2));
    settle().await;
    assert!(f.locator.is_searching());

    assert!(matches!(
        f.locator.search_with("upnp:rootdevice", Duration::from_secs(2)).await,
        Err(SsdpError::InvalidOperation(_))
    ));
    assert!(first.await.unwrap().unwrap().is_empty());
    assert!(!f.locator.is_searching());
}

#[tokio::test(start_paused = true)]
async fn test_search_collects_responses() {
    let f = fixture();
    let mut events = f.locator.subscribe();
    let search = f.spawn_search("upnp:rootdevice", Duration::from_secs(3));
    settle().await;

    let sent: Vec<_> = f.network.sent_to(GROUP).into_iter().filter(|d| d.is_search()).collect();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].header("ST").as_deref(), Some("upnp:rootdevice"));
    assert_eq!(sent[0].header("MX").as_deref(), Some("2"));
    assert_eq!(sent[0].header("MAN").as_deref(), Some("\"ssdp:discover\""));

    f.respond("upnp:rootdevice", "uuid:A::upnp:rootdevice");
    f.respond("upnp:rootdevice", "uuid:B::upnp:rootdevice");
    f.respond("upnp:rootdevice", "uuid:A::upnp:rootdevice");
    let mut failed = support::response_text("upnp:rootdevice", "uuid:C::upnp:rootdevice", "http://x/", 60);
    failed = failed.replacen("200 OK", "404 Not Found", 1);
    f.network.send(f.remote, f.comms.local_endpoint().unwrap(), &failed);

    let found = search.await.unwrap().unwrap();
    let mut usns: Vec<&str> = found.iter().map(|d| d.usn.as_str()).collect();
    usns.sort();
    assert_eq!(usns, vec!["uuid:A::upnp:rootdevice", "uuid:B::upnp:rootdevice"]);

    let news = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, LocatorEvent::DeviceAvailable { is_new_device: true, .. }))
        .count();
    assert_eq!(news, 2);
    assert_eq!(f.locator.cached_devices().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_byebye_during_search_drops_result() {
    let f = fixture();
    f.comms.begin_listening_for_broadcasts().unwrap();
    let search = f.spawn_search("ssdp:all", Duration::from_secs(2));
    settle().await;

    f.respond("uuid:A", "uuid:A");
    f.respond("uuid:B", "uuid:B");
    settle().await;
    f.byebye("uuid:A", "uuid:A");

    let found = search.await.unwrap().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].usn, "uuid:B");
}

#[tokio::test(start_paused = true)]
async fn test_expiry_sweep_raises_expired() {
    let f = fixture();
    let mut events = f.locator.subscribe();
    f.locator.start_listening_for_notifications().unwrap();
    f.alive("uuid:A", "uuid:A", 30);
    settle().await;
    drain(&mut events);

    sleep(Duration::from_secs(61)).await;
    let seen = drain(&mut events);
    assert!(matches!(&seen[..], [LocatorEvent::DeviceUnavailable { expired: true, device }] if device.usn == "uuid:A"));
    assert!(f.locator.cached_devices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_events_after_dispose() {
    let f = fixture();
    let mut events = f.locator.subscribe();
    f.locator.start_listening_for_notifications().unwrap();
    f.locator.dispose();

    f.alive("uuid:A", "uuid:A", 1800);
    settle().await;
    assert!(events.recv().await.is_none());
    assert!(f.locator.is_disposed());
    assert!(matches!(f.locator.search().await, Err(SsdpError::Disposed(_))));
    assert!(f.locator.start_listening_for_notifications().unwrap_err().is_disposed());
}
