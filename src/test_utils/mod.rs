//! Shared fixtures for unit tests.
//!
//! `tests/` integration tests build the same wiring through the public API.

use std::net::IpAddr;
use std::sync::Arc;

use crate::ChangeEventBus;
use crate::ConfigKey;
use crate::ConfigRecord;
use crate::MemoryConfigStore;
use crate::Mutation;
use crate::MutationConfig;
use crate::MutationOutcome;
use crate::Variant;
use crate::VariantResolver;

pub const TEST_GROUP: &str = "DEFAULT_GROUP";

pub fn key(data_id: &str) -> ConfigKey {
    ConfigKey::new(data_id, TEST_GROUP, "")
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// Store, bus and resolver wired together the way the service does it
pub struct Harness {
    pub store: Arc<MemoryConfigStore>,
    pub bus: Arc<ChangeEventBus>,
    pub resolver: Arc<VariantResolver>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(MutationConfig::default())
    }

    pub fn with_config(config: MutationConfig) -> Self {
        let store = Arc::new(MemoryConfigStore::new());
        let bus = Arc::new(ChangeEventBus::new());
        let resolver = Arc::new(VariantResolver::new(store.clone(), bus.clone(), &config));
        Self { store, bus, resolver }
    }

    /// Formal publish that must succeed
    pub async fn publish(
        &self,
        key: &ConfigKey,
        content: &str,
    ) -> ConfigRecord {
        match self
            .resolver
            .mutate(key, Variant::Formal, Mutation::publish(content))
            .await
            .unwrap()
        {
            MutationOutcome::Published(record) => record,
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}

/// Yields to the scheduler until `condition` holds.
pub async fn wait_until<F>(condition: F)
where
    F: Fn() -> bool,
{
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
