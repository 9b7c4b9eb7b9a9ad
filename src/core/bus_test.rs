//! Unit tests for the change event bus
//!
//! - Fan-out to every subscriber of a key
//! - Key isolation
//! - Beta allowlist and tag filtering
//! - Index cleanup on unsubscribe

use std::net::IpAddr;

use tokio::sync::mpsc;

use super::bus::*;
use super::ChangeEvent;
use super::ChangeKind;
use super::ConfigKey;
use super::Variant;

fn key(data_id: &str) -> ConfigKey {
    ConfigKey::new(data_id, "DEFAULT_GROUP", "")
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn subscribe(
    bus: &ChangeEventBus,
    key: &ConfigKey,
    session_id: SessionId,
    client_ip: Option<IpAddr>,
    tag: Option<&str>,
) -> mpsc::UnboundedReceiver<ChangeEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    bus.subscribe(
        key.clone(),
        Subscription::new(session_id, client_ip, tag.map(String::from), "d0".into(), tx),
    );
    rx
}

#[test]
fn publish_reaches_every_subscriber_of_the_key() {
    let bus = ChangeEventBus::new();
    let k = key("app.yaml");
    let mut rx1 = subscribe(&bus, &k, 1, None, None);
    let mut rx2 = subscribe(&bus, &k, 2, None, None);

    let event = ChangeEvent::new(k.clone(), Variant::Formal, ChangeKind::Publish);
    assert_eq!(bus.publish(&event), 2);

    assert_eq!(rx1.try_recv().unwrap(), event);
    assert_eq!(rx2.try_recv().unwrap(), event);
}

#[test]
fn publish_ignores_other_keys() {
    let bus = ChangeEventBus::new();
    let mut rx = subscribe(&bus, &key("a"), 1, None, None);

    let delivered = bus.publish(&ChangeEvent::new(key("b"), Variant::Formal, ChangeKind::Publish));

    assert_eq!(delivered, 0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn beta_events_only_reach_allowlisted_clients() {
    let bus = ChangeEventBus::new();
    let k = key("a");
    let mut inside = subscribe(&bus, &k, 1, Some(ip("10.0.0.1")), None);
    let mut outside = subscribe(&bus, &k, 2, Some(ip("10.0.0.2")), None);
    let mut unknown = subscribe(&bus, &k, 3, None, None);

    let event = ChangeEvent::new(k, Variant::beta([ip("10.0.0.1")]), ChangeKind::Publish);
    assert_eq!(bus.publish(&event), 1);

    assert!(inside.try_recv().is_ok());
    assert!(outside.try_recv().is_err());
    assert!(unknown.try_recv().is_err());
}

#[test]
fn tag_events_only_reach_sessions_requesting_that_tag() {
    let bus = ChangeEventBus::new();
    let k = key("a");
    let mut green = subscribe(&bus, &k, 1, None, Some("green"));
    let mut blue = subscribe(&bus, &k, 2, None, Some("blue"));
    let mut untagged = subscribe(&bus, &k, 3, None, None);

    bus.publish(&ChangeEvent::new(k.clone(), Variant::tag("green"), ChangeKind::Delete));

    assert!(green.try_recv().is_ok());
    assert!(blue.try_recv().is_err());
    assert!(untagged.try_recv().is_err());

    // Formal changes are visible to everyone
    assert_eq!(bus.publish(&ChangeEvent::new(k, Variant::Formal, ChangeKind::Publish)), 3);
}

#[test]
fn unsubscribe_removes_empty_key_entries() {
    let bus = ChangeEventBus::new();
    let k = key("a");
    let _rx1 = subscribe(&bus, &k, 1, None, None);
    let _rx2 = subscribe(&bus, &k, 2, None, None);
    assert_eq!(bus.subscriber_count(&k), 2);
    assert_eq!(bus.watched_key_count(), 1);

    bus.unsubscribe(&k, 1);
    assert_eq!(bus.subscriber_count(&k), 1);

    bus.unsubscribe(&k, 2);
    assert_eq!(bus.subscriber_count(&k), 0);
    assert_eq!(bus.watched_key_count(), 0);

    // Unknown session is a no-op
    bus.unsubscribe(&k, 42);
}

#[test]
fn closed_receivers_are_not_counted_as_delivered() {
    let bus = ChangeEventBus::new();
    let k = key("a");
    let rx = subscribe(&bus, &k, 1, None, None);
    drop(rx);

    assert_eq!(bus.publish(&ChangeEvent::new(k, Variant::Formal, ChangeKind::Publish)), 0);
}

#[test]
fn snapshot_lists_ip_and_declared_digest() {
    let bus = ChangeEventBus::new();
    let k = key("a");
    let _rx = subscribe(&bus, &k, 1, Some(ip("10.0.0.7")), None);

    let snapshot = bus.snapshot(&k);
    assert_eq!(snapshot.get("10.0.0.7").map(String::as_str), Some("d0"));
    assert!(bus.snapshot(&key("other")).is_empty());
}
