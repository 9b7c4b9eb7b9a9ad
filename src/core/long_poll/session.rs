use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ConfigKey;
use crate::SessionId;

/// Lifecycle of a listener session
///
/// ```text
/// Received ──► Waiting ──┬──► ResolvedChanged ──► Closed
///                        ├──► ResolvedTimeout ──► Closed
///                        └──────────────────────► Closed   (caller went away)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Received = 0,
    Waiting = 1,
    ResolvedChanged = 2,
    ResolvedTimeout = 3,
    Closed = 4,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Received,
            1 => SessionState::Waiting,
            2 => SessionState::ResolvedChanged,
            3 => SessionState::ResolvedTimeout,
            _ => SessionState::Closed,
        }
    }
}

/// A suspended watch request.
///
/// Owned by the session manager; the subscriber index refers to it only by
/// [`SessionId`].
#[derive(Debug)]
pub struct ListenerSession {
    id: SessionId,
    client_id: String,
    client_ip: Option<IpAddr>,
    watch_set: BTreeMap<ConfigKey, String>,
    requested_tag: Option<String>,
    created_at: Instant,
    deadline: Instant,
    state: AtomicU8,
    /// Keys found changed so far, in discovery order
    changed: Mutex<Vec<ConfigKey>>,
    /// Stops the event task once the session is resolved
    cancel: CancellationToken,
}

impl ListenerSession {
    pub fn new(
        id: SessionId,
        client_id: String,
        client_ip: Option<IpAddr>,
        watch_set: BTreeMap<ConfigKey, String>,
        requested_tag: Option<String>,
        deadline: Instant,
    ) -> Self {
        Self {
            id,
            client_id,
            client_ip,
            watch_set,
            requested_tag,
            created_at: Instant::now(),
            deadline,
            state: AtomicU8::new(SessionState::Received as u8),
            changed: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    pub fn watch_set(&self) -> &BTreeMap<ConfigKey, String> {
        &self.watch_set
    }

    pub fn requested_tag(&self) -> Option<&str> {
        self.requested_tag.as_deref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// `Received → Waiting`
    pub(crate) fn enter_waiting(&self) -> bool {
        self.transition(SessionState::Received, SessionState::Waiting)
    }

    /// Single-winner transition out of `Waiting`.
    ///
    /// Returns `true` for exactly one caller per session; every other
    /// caller, concurrent or later, gets `false` and must not respond.
    pub fn try_resolve(
        &self,
        to: SessionState,
    ) -> bool {
        debug_assert!(matches!(
            to,
            SessionState::ResolvedChanged | SessionState::ResolvedTimeout | SessionState::Closed
        ));
        self.transition(SessionState::Waiting, to)
    }

    /// Terminal state, set by the resolution winner after cleanup
    pub(crate) fn close(&self) {
        self.state.store(SessionState::Closed as u8, Ordering::Release);
    }

    fn transition(
        &self,
        from: SessionState,
        to: SessionState,
    ) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn record_changed(
        &self,
        key: &ConfigKey,
    ) {
        let mut changed = self.changed.lock();
        if !changed.contains(key) {
            changed.push(key.clone());
        }
    }

    pub(crate) fn has_changes(&self) -> bool {
        !self.changed.lock().is_empty()
    }

    pub(crate) fn take_changed(&self) -> Vec<ConfigKey> {
        std::mem::take(&mut *self.changed.lock())
    }
}
