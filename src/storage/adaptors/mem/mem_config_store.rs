use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use crate::utils::time::get_now_as_millis;
use crate::ConfigKey;
use crate::ConfigRecord;
use crate::ConfigStore;
use crate::RecordFilter;
use crate::Result;
use crate::VariantSelector;

type Slot = (ConfigKey, VariantSelector);

/// In-memory record store
///
/// Backs the standalone binary and the test-suite. Namespaces other than the
/// default one must be created explicitly.
#[derive(Debug)]
pub struct MemoryConfigStore {
    records: RwLock<BTreeMap<Slot, ConfigRecord>>,
    namespaces: RwLock<HashSet<String>>,
    next_id: AtomicU64,
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            namespaces: RwLock::new(HashSet::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn create_namespace(
        &self,
        tenant: impl Into<String>,
    ) {
        self.namespaces.write().insert(tenant.into());
    }

    /// Number of stored records across all variants
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(
        &self,
        key: &ConfigKey,
        selector: &VariantSelector,
    ) -> Result<Option<ConfigRecord>> {
        let slot = (key.clone(), selector.clone());
        Ok(self.records.read().get(&slot).cloned())
    }

    async fn upsert(
        &self,
        mut record: ConfigRecord,
    ) -> Result<ConfigRecord> {
        let slot = (record.key.clone(), record.selector());
        let mut records = self.records.write();

        let now = get_now_as_millis();
        (record.id, record.created_ms) = match records.get(&slot) {
            Some(existing) => (existing.id, existing.created_ms),
            None => (self.next_id.fetch_add(1, Ordering::Relaxed), now),
        };
        record.last_modified_ms = now;

        trace!(key = %record.key, variant = %slot.1, id = record.id, "upsert record");
        records.insert(slot, record.clone());
        Ok(record)
    }

    async fn remove(
        &self,
        key: &ConfigKey,
        selector: &VariantSelector,
    ) -> Result<Option<ConfigRecord>> {
        let slot = (key.clone(), selector.clone());
        Ok(self.records.write().remove(&slot))
    }

    async fn find_by_ids(
        &self,
        ids: &[u64],
    ) -> Result<Vec<ConfigRecord>> {
        let wanted: HashSet<u64> = ids.iter().copied().collect();
        Ok(self
            .records
            .read()
            .iter()
            .filter(|((_, selector), r)| *selector == VariantSelector::Formal && wanted.contains(&r.id))
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn list(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<ConfigRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|((_, selector), r)| *selector == VariantSelector::Formal && filter.matches(r))
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn namespace_exists(
        &self,
        tenant: &str,
    ) -> Result<bool> {
        Ok(tenant.is_empty() || self.namespaces.read().contains(tenant))
    }
}
