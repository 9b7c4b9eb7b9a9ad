//! Change Event Bus
//!
//! In-process fan-out of [`ChangeEvent`]s to long-poll sessions.
//!
//! ```text
//! mutate() ── publish(event) ──► DashMap<ConfigKey, {session_id → Subscription}>
//!                                   │ (shard lock of event.key only)
//!                                   ▼
//!                          per-session unbounded mpsc ──► session task
//! ```
//!
//! - Subscribers are indexed by key in a sharded map, so unrelated keys
//!   never contend on the same lock.
//! - Delivery is a non-blocking channel send; a slow session never delays
//!   the writer or other sessions.
//! - Every subscriber registered when `publish` runs has the event queued
//!   by the time `publish` returns.
//! - Nothing is persisted or replayed.

use std::collections::HashMap;
use std::net::IpAddr;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

use super::ChangeEvent;
use super::ConfigKey;
use crate::EVENT_DELIVERIES;

/// Stable identifier of a listener session
pub type SessionId = u64;

/// One session's interest in one key
#[derive(Debug, Clone)]
pub struct Subscription {
    pub session_id: SessionId,
    pub client_ip: Option<IpAddr>,
    pub requested_tag: Option<String>,
    /// Digest the client declared for the subscribed key
    pub client_digest: String,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

impl Subscription {
    pub fn new(
        session_id: SessionId,
        client_ip: Option<IpAddr>,
        requested_tag: Option<String>,
        client_digest: String,
        sender: mpsc::UnboundedSender<ChangeEvent>,
    ) -> Self {
        Self {
            session_id,
            client_ip,
            requested_tag,
            client_digest,
            sender,
        }
    }

    fn wants(
        &self,
        event: &ChangeEvent,
    ) -> bool {
        event.is_relevant_to(self.client_ip, self.requested_tag.as_deref())
    }
}

#[derive(Debug, Default)]
pub struct ChangeEventBus {
    subscribers: DashMap<ConfigKey, HashMap<SessionId, Subscription>>,
}

impl ChangeEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        key: ConfigKey,
        subscription: Subscription,
    ) {
        trace!(key = %key, session_id = subscription.session_id, "subscribe");
        self.subscribers
            .entry(key)
            .or_default()
            .insert(subscription.session_id, subscription);
    }

    /// Drops the key entry atomically once its last subscriber leaves.
    pub fn unsubscribe(
        &self,
        key: &ConfigKey,
        session_id: SessionId,
    ) {
        self.subscribers.remove_if_mut(key, |_key, sessions| {
            sessions.remove(&session_id);
            sessions.is_empty()
        });
        trace!(key = %key, session_id, "unsubscribe");
    }

    /// Queues `event` for every interested subscriber of `event.key`.
    ///
    /// Returns how many subscribers it was handed to.
    pub fn publish(
        &self,
        event: &ChangeEvent,
    ) -> usize {
        let Some(sessions) = self.subscribers.get(&event.key) else {
            return 0;
        };

        let mut delivered = 0;
        for subscription in sessions.values().filter(|s| s.wants(event)) {
            // A closed receiver means the session is resolving; it cleans its
            // own index entries.
            if subscription.sender.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }

        trace!(
            key = %event.key,
            kind = ?event.kind,
            subscribers = sessions.len(),
            delivered,
            "event fanned out"
        );
        EVENT_DELIVERIES.inc_by(delivered as u64);
        delivered
    }

    /// `{client ip → declared digest}` of the current subscribers of `key`.
    pub fn snapshot(
        &self,
        key: &ConfigKey,
    ) -> HashMap<String, String> {
        self.subscribers
            .get(key)
            .map(|sessions| {
                sessions
                    .values()
                    .map(|s| {
                        let ip = s.client_ip.map(|ip| ip.to_string()).unwrap_or_default();
                        (ip, s.client_digest.clone())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn subscriber_count(
        &self,
        key: &ConfigKey,
    ) -> usize {
        self.subscribers.get(key).map(|s| s.len()).unwrap_or(0)
    }

    pub fn watched_key_count(&self) -> usize {
        self.subscribers.len()
    }
}
