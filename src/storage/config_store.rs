//! ConfigStore
//!
//! Interface of the durable record store. The core only ever reads records
//! to compute digests and resolve variants, and writes exactly one variant
//! record per mutation. Implementations own ids and timestamps.

#[cfg(test)]
use mockall::automock;
use async_trait::async_trait;
use serde::Serialize;

use crate::utils::pattern::wildcard_match;
use crate::ConfigKey;
use crate::ConfigRecord;
use crate::Result;
use crate::VariantSelector;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync + 'static {
    async fn get(
        &self,
        key: &ConfigKey,
        selector: &VariantSelector,
    ) -> Result<Option<ConfigRecord>>;

    /// Insert or replace the record in its `(key, variant)` slot.
    ///
    /// Returns the stored record with `id`, `created_ms` and
    /// `last_modified_ms` assigned; an update keeps the first two.
    async fn upsert(
        &self,
        record: ConfigRecord,
    ) -> Result<ConfigRecord>;

    /// Returns the removed record, `None` if the slot was empty.
    async fn remove(
        &self,
        key: &ConfigKey,
        selector: &VariantSelector,
    ) -> Result<Option<ConfigRecord>>;

    /// Formal records with the given ids; unknown ids are ignored.
    async fn find_by_ids(
        &self,
        ids: &[u64],
    ) -> Result<Vec<ConfigRecord>>;

    /// All formal records matching the filter, ordered by key.
    async fn list(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<ConfigRecord>>;

    async fn namespace_exists(
        &self,
        tenant: &str,
    ) -> Result<bool>;

    /// Paged [`ConfigStore::list`]; `page_no` starts at 1.
    async fn search(
        &self,
        filter: &RecordFilter,
        page_no: usize,
        page_size: usize,
    ) -> Result<Page<ConfigRecord>> {
        let all = self.list(filter).await?;
        Ok(Page::slice(all, page_no, page_size))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Fields compare literally
    #[default]
    Exact,
    /// `*` in a field matches any run of characters
    Wildcard,
}

/// Selects formal records within one tenant. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub tenant: String,
    pub data_id: Option<String>,
    pub group: Option<String>,
    pub app_name: Option<String>,
    pub mode: MatchMode,
}

impl RecordFilter {
    pub fn tenant(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            ..Default::default()
        }
    }

    pub fn matches(
        &self,
        record: &ConfigRecord,
    ) -> bool {
        record.key.tenant == self.tenant
            && self.field_matches(self.data_id.as_deref(), &record.key.data_id)
            && self.field_matches(self.group.as_deref(), &record.key.group)
            && self.field_matches(self.app_name.as_deref(), record.app_name.as_deref().unwrap_or(""))
    }

    fn field_matches(
        &self,
        pattern: Option<&str>,
        value: &str,
    ) -> bool {
        match pattern.filter(|p| !p.is_empty()) {
            None => true,
            Some(p) => match self.mode {
                MatchMode::Exact => p == value,
                MatchMode::Wildcard => wildcard_match(p, value),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub page_no: usize,
    pub pages_available: usize,
    pub total_count: usize,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn slice(
        all: Vec<T>,
        page_no: usize,
        page_size: usize,
    ) -> Self {
        let page_no = page_no.max(1);
        let page_size = page_size.max(1);
        let total_count = all.len();
        let pages_available = total_count.div_ceil(page_size);
        let items = all
            .into_iter()
            .skip((page_no - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();
        Self {
            page_no,
            pages_available,
            total_count,
            items,
        }
    }
}
