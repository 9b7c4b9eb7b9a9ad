use std::net::IpAddr;

use serde::Serialize;

use super::ConfigKey;
use super::Variant;
use crate::utils::time::monotonic_now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    /// Record inserted or replaced
    Publish,
    /// Record explicitly removed
    Delete,
}

/// Emitted once per successful mutation; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub key: ConfigKey,
    /// Variant the mutation touched. For beta mutations the allowlist is the
    /// union of the old and new lists.
    pub variant: Variant,
    pub timestamp_ms: u64,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(
        key: ConfigKey,
        variant: Variant,
        kind: ChangeKind,
    ) -> Self {
        Self {
            key,
            variant,
            timestamp_ms: monotonic_now_ms(),
            kind,
        }
    }

    /// Whether a listener with this address and requested tag can see the
    /// changed variant at all.
    pub fn is_relevant_to(
        &self,
        client_ip: Option<IpAddr>,
        requested_tag: Option<&str>,
    ) -> bool {
        match &self.variant {
            Variant::Formal => true,
            Variant::Beta { ips } => client_ip.is_some_and(|ip| ips.contains(&ip)),
            Variant::Tag { label } => requested_tag == Some(label.as_str()),
        }
    }
}
