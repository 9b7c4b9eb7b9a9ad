//! Long-Poll Session Manager
//!
//! ```text
//! poll() ── immediate digest check ── changed? ──► respond (no subscription)
//!              │ unchanged
//!              ▼
//!      reserve slot ─► subscribe every key ─► re-check ─► suspend
//!                                                          │
//!         ┌────────────────────────────────────────────────┤
//!         ▼                                                ▼
//!   event task (per session)                       caller future
//!   bus event → recompute digest                   deadline reached
//!   differs → CAS Waiting→ResolvedChanged          CAS Waiting→ResolvedTimeout
//!         └──────────── winner: cancel, unsubscribe, respond once ──┘
//! ```
//!
//! Sessions are futures, never threads. The only shared state is the
//! subscriber index (sharded per key inside the bus) and each session's
//! atomic state, so timeout, event delivery and caller disconnect can race
//! from different tasks and still resolve the session exactly once.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::ListenerSession;
use super::SessionState;
use crate::digest_of_record;
use crate::differs;
use crate::ChangeEvent;
use crate::ChangeEventBus;
use crate::ConfigKey;
use crate::Error;
use crate::LongPollConfig;
use crate::Result;
use crate::SessionId;
use crate::Subscription;
use crate::VariantResolver;
use crate::LONG_POLL_HOLD_MS;
use crate::LONG_POLL_RESOLUTIONS;
use crate::LONG_POLL_WAITING;

/// A watch request: the keys a client holds and the digests it holds them at.
#[derive(Debug, Clone)]
pub struct PollRequest {
    pub client_id: String,
    pub client_ip: Option<IpAddr>,
    /// Key → client-held digest; the empty digest means "I have nothing"
    pub watch_set: BTreeMap<ConfigKey, String>,
    pub requested_tag: Option<String>,
    /// Zero disables suspension: only the immediate check runs
    pub hold: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resolution {
    /// Digest mismatch found before suspending
    Immediate,
    /// A change event resolved the suspended session
    Changed,
    /// Hold time elapsed (or the manager shut down); client re-polls
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollResponse {
    pub changed_keys: Vec<ConfigKey>,
    pub resolution: Resolution,
}

impl PollResponse {
    fn new(
        changed_keys: Vec<ConfigKey>,
        resolution: Resolution,
    ) -> Self {
        Self {
            changed_keys,
            resolution,
        }
    }

    fn timeout() -> Self {
        Self::new(Vec::new(), Resolution::Timeout)
    }
}

struct ManagerInner {
    resolver: Arc<VariantResolver>,
    bus: Arc<ChangeEventBus>,
    /// Waiting sessions by stable id
    sessions: DashMap<SessionId, Arc<ListenerSession>>,
    next_id: AtomicU64,
    waiting: AtomicUsize,
    max_waiting: usize,
    max_keys: usize,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ManagerInner {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ManagerInner")
            .field("sessions", &self.sessions.len())
            .field("waiting", &self.waiting)
            .field("max_waiting", &self.max_waiting)
            .finish_non_exhaustive()
    }
}

/// Holds suspended watch requests and resolves each exactly once.
///
/// Cheap to clone; clones share the same sessions.
#[derive(Debug, Clone)]
pub struct LongPollManager {
    inner: Arc<ManagerInner>,
}

/// Resolves the session as `Closed` if the caller's future is dropped while
/// it is still waiting.
struct SessionGuard {
    inner: Arc<ManagerInner>,
    session: Arc<ListenerSession>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.session.try_resolve(SessionState::Closed) {
            debug!(session_id = self.session.id(), "listener went away while waiting");
            self.inner.finish(&self.session, "abandoned");
        }
    }
}

impl LongPollManager {
    pub fn new(
        resolver: Arc<VariantResolver>,
        bus: Arc<ChangeEventBus>,
        config: &LongPollConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                resolver,
                bus,
                sessions: DashMap::new(),
                next_id: AtomicU64::new(1),
                waiting: AtomicUsize::new(0),
                max_waiting: config.max_waiting_sessions,
                max_keys: config.max_keys_per_poll,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Answers with the keys whose effective digest differs from the
    /// client's, waiting up to `request.hold` for one to change.
    ///
    /// An empty answer is a heartbeat, not an error.
    pub async fn poll(
        &self,
        request: PollRequest,
    ) -> Result<PollResponse> {
        self.validate(&request)?;
        let inner = &self.inner;
        let ip = request.client_ip;
        let tag = request.requested_tag.as_deref();

        let changed = inner.compare(&request.watch_set, ip, tag).await?;
        if !changed.is_empty() {
            LONG_POLL_RESOLUTIONS.with_label_values(&["immediate"]).inc();
            return Ok(PollResponse::new(changed, Resolution::Immediate));
        }

        if request.hold.is_zero() || inner.shutdown.is_cancelled() {
            LONG_POLL_RESOLUTIONS.with_label_values(&["no_hangup"]).inc();
            return Ok(PollResponse::timeout());
        }

        inner.reserve_slot()?;

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let client_id = if request.client_id.is_empty() {
            nanoid::nanoid!()
        } else {
            request.client_id
        };
        let session = Arc::new(ListenerSession::new(
            id,
            client_id,
            ip,
            request.watch_set,
            request.requested_tag,
            Instant::now() + request.hold,
        ));
        session.enter_waiting();
        inner.sessions.insert(id, session.clone());
        let _guard = SessionGuard {
            inner: inner.clone(),
            session: session.clone(),
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        for (key, digest) in session.watch_set() {
            inner.bus.subscribe(
                key.clone(),
                Subscription::new(
                    id,
                    ip,
                    session.requested_tag().map(String::from),
                    digest.clone(),
                    event_tx.clone(),
                ),
            );
        }
        drop(event_tx);
        trace!(
            session_id = id,
            client_id = session.client_id(),
            keys = session.watch_set().len(),
            "listener waiting"
        );

        // A write committed between the first check and subscription has
        // published to nobody; catch it here.
        for key in inner
            .compare(session.watch_set(), ip, session.requested_tag())
            .await?
        {
            session.record_changed(&key);
        }
        if session.has_changes() && session.try_resolve(SessionState::ResolvedChanged) {
            let keys = session.take_changed();
            inner.finish(&session, "changed");
            return Ok(PollResponse::new(keys, Resolution::Changed));
        }

        let (respond_tx, mut respond_rx) = oneshot::channel();
        tokio::spawn(inner.clone().watch_events(session.clone(), event_rx, respond_tx));

        tokio::select! {
            responded = &mut respond_rx => return Ok(inner.on_response(&session, responded)),
            _ = sleep_until(session.deadline()) => {}
            _ = inner.shutdown.cancelled() => {}
        }
        Ok(inner.on_deadline(&session, respond_rx).await)
    }

    /// `{client ip → declared digest}` of the listeners currently waiting on `key`
    pub fn listeners(
        &self,
        key: &ConfigKey,
    ) -> std::collections::HashMap<String, String> {
        self.inner.bus.snapshot(key)
    }

    pub fn waiting_sessions(&self) -> usize {
        self.inner.waiting.load(Ordering::Acquire)
    }

    /// Answers every waiting session with an empty result and stops
    /// suspending new ones.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    fn validate(
        &self,
        request: &PollRequest,
    ) -> Result<()> {
        if request.watch_set.is_empty() {
            return Err(Error::Validation("watch set must not be empty".into()));
        }
        if request.watch_set.len() > self.inner.max_keys {
            return Err(Error::Validation(format!(
                "watch set exceeds {} keys (got {})",
                self.inner.max_keys,
                request.watch_set.len()
            )));
        }
        request.watch_set.keys().try_for_each(ConfigKey::validate)
    }
}

impl ManagerInner {
    /// Keys whose effective digest for this requester differs from the
    /// client's.
    async fn compare(
        &self,
        watch_set: &BTreeMap<ConfigKey, String>,
        client_ip: Option<IpAddr>,
        requested_tag: Option<&str>,
    ) -> Result<Vec<ConfigKey>> {
        let mut changed = Vec::new();
        for (key, client_digest) in watch_set {
            let record = self.resolver.resolve(key, client_ip, requested_tag).await?;
            if differs(client_digest, digest_of_record(record.as_ref())) {
                changed.push(key.clone());
            }
        }
        Ok(changed)
    }

    fn reserve_slot(&self) -> Result<()> {
        let limit = self.max_waiting;
        self.waiting
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .map(|_| LONG_POLL_WAITING.inc())
            .map_err(|waiting| {
                LONG_POLL_RESOLUTIONS.with_label_values(&["overload"]).inc();
                warn!(waiting, limit, "rejecting listener: session manager at capacity");
                Error::Overload { waiting, limit }
            })
    }

    /// Event path. Ends when the session is resolved by anyone.
    async fn watch_events(
        self: Arc<Self>,
        session: Arc<ListenerSession>,
        mut events: mpsc::UnboundedReceiver<ChangeEvent>,
        respond: oneshot::Sender<Vec<ConfigKey>>,
    ) {
        let cancel = session.cancel_token().clone();
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => return,
                },
            };

            if !self.check_key(&session, &event.key).await {
                continue;
            }

            // Accumulate whatever else is already queued before resolving
            while let Ok(queued) = events.try_recv() {
                self.check_key(&session, &queued.key).await;
            }

            if session.try_resolve(SessionState::ResolvedChanged) {
                let keys = session.take_changed();
                self.finish(&session, "changed");
                let _ = respond.send(keys);
            }
            return;
        }
    }

    /// Records `key` as changed if its effective digest no longer matches
    /// the client's. Republishing identical content is not a change.
    async fn check_key(
        &self,
        session: &ListenerSession,
        key: &ConfigKey,
    ) -> bool {
        let Some(client_digest) = session.watch_set().get(key) else {
            return false;
        };
        match self
            .resolver
            .resolve(key, session.client_ip(), session.requested_tag())
            .await
        {
            Ok(record) if differs(client_digest, digest_of_record(record.as_ref())) => {
                session.record_changed(key);
                true
            }
            Ok(_) => {
                trace!(session_id = session.id(), key = %key, "no-op change ignored");
                false
            }
            Err(e) => {
                warn!(session_id = session.id(), key = %key, "digest recompute failed: {:?}", e);
                false
            }
        }
    }

    fn on_response(
        &self,
        session: &ListenerSession,
        responded: std::result::Result<Vec<ConfigKey>, oneshot::error::RecvError>,
    ) -> PollResponse {
        match responded {
            Ok(keys) => PollResponse::new(keys, Resolution::Changed),
            // Event task ended without winning; settle as a timeout
            Err(_) => {
                if session.try_resolve(SessionState::ResolvedTimeout) {
                    self.finish(session, "timeout");
                }
                PollResponse::timeout()
            }
        }
    }

    async fn on_deadline(
        &self,
        session: &ListenerSession,
        respond_rx: oneshot::Receiver<Vec<ConfigKey>>,
    ) -> PollResponse {
        if session.try_resolve(SessionState::ResolvedTimeout) {
            self.finish(session, "timeout");
            return PollResponse::timeout();
        }
        // The event path won the race; its answer is on the way
        match respond_rx.await {
            Ok(keys) => PollResponse::new(keys, Resolution::Changed),
            Err(_) => PollResponse::timeout(),
        }
    }

    /// Cleanup run once, by whichever path won the session.
    fn finish(
        &self,
        session: &ListenerSession,
        outcome: &'static str,
    ) {
        session.cancel_token().cancel();
        for key in session.watch_set().keys() {
            self.bus.unsubscribe(key, session.id());
        }
        self.sessions.remove(&session.id());
        self.waiting.fetch_sub(1, Ordering::AcqRel);
        session.close();

        let held = Instant::now().saturating_duration_since(session.created_at());
        LONG_POLL_WAITING.dec();
        LONG_POLL_RESOLUTIONS.with_label_values(&[outcome]).inc();
        LONG_POLL_HOLD_MS.observe(held.as_millis() as f64);
        trace!(session_id = session.id(), outcome, "listener resolved");
    }
}
