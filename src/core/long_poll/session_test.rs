use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::*;
use crate::ConfigKey;

fn session() -> ListenerSession {
    let mut watch_set = BTreeMap::new();
    watch_set.insert(ConfigKey::new("app.yaml", "DEFAULT_GROUP", ""), "d1".to_string());
    ListenerSession::new(
        7,
        "client-a".into(),
        None,
        watch_set,
        None,
        Instant::now() + Duration::from_secs(30),
    )
}

#[test]
fn resolution_requires_waiting_state() {
    let s = session();
    assert_eq!(s.state(), SessionState::Received);
    assert!(!s.try_resolve(SessionState::ResolvedTimeout));

    assert!(s.enter_waiting());
    assert!(!s.enter_waiting());
    assert_eq!(s.state(), SessionState::Waiting);
}

#[test]
fn only_first_resolution_wins() {
    let s = session();
    s.enter_waiting();

    assert!(s.try_resolve(SessionState::ResolvedChanged));
    assert!(!s.try_resolve(SessionState::ResolvedTimeout));
    assert!(!s.try_resolve(SessionState::Closed));
    assert_eq!(s.state(), SessionState::ResolvedChanged);

    s.close();
    assert_eq!(s.state(), SessionState::Closed);
}

#[test]
fn concurrent_resolvers_produce_exactly_one_winner() {
    for _ in 0..50 {
        let s = Arc::new(session());
        s.enter_waiting();
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = s.clone();
                let winners = winners.clone();
                std::thread::spawn(move || {
                    let to = if i % 2 == 0 {
                        SessionState::ResolvedChanged
                    } else {
                        SessionState::ResolvedTimeout
                    };
                    if s.try_resolve(to) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn changed_keys_are_deduplicated_in_discovery_order() {
    let s = session();
    let a = ConfigKey::new("a", "g", "");
    let b = ConfigKey::new("b", "g", "");

    assert!(!s.has_changes());
    s.record_changed(&b);
    s.record_changed(&a);
    s.record_changed(&b);

    assert!(s.has_changes());
    assert_eq!(s.take_changed(), vec![b, a]);
    assert!(!s.has_changes());
}
