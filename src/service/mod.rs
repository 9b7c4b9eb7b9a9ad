//! ConfigService
//!
//! The operations exposed to the outside world. Every write goes through
//! the [`VariantResolver`], so each successful write has notified the
//! waiting listeners by the time the call returns.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::constants::PUBLIC_NAMESPACE;
use crate::AdvanceInfo;
use crate::Archive;
use crate::BatchCoordinator;
use crate::BatchItem;
use crate::BatchResult;
use crate::ChangeEventBus;
use crate::ConfigCatalog;
use crate::ConfigKey;
use crate::ConfigRecord;
use crate::ConfigStore;
use crate::ConflictPolicy;
use crate::Error;
use crate::LongPollConfig;
use crate::LongPollManager;
use crate::MatchMode;
use crate::Mutation;
use crate::MutationOutcome;
use crate::Page;
use crate::PollRequest;
use crate::PollResponse;
use crate::RecordFilter;
use crate::Result;
use crate::Settings;
use crate::Variant;
use crate::VariantResolver;
use crate::VariantSelector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub key: ConfigKey,
    pub content: String,
    pub variant: Variant,
    pub app_name: Option<String>,
    pub content_type: Option<String>,
    pub advance: AdvanceInfo,
}

impl PublishRequest {
    pub fn formal(
        key: ConfigKey,
        content: impl Into<String>,
    ) -> Self {
        Self {
            key,
            content: content.into(),
            variant: Variant::Formal,
            app_name: None,
            content_type: None,
            advance: AdvanceInfo::default(),
        }
    }

    pub fn with_variant(
        mut self,
        variant: Variant,
    ) -> Self {
        self.variant = variant;
        self
    }
}

/// Which formal records to export
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportFilter {
    /// Records of one tenant; `None` fields match anything
    Pattern {
        tenant: String,
        data_id: Option<String>,
        group: Option<String>,
        app_name: Option<String>,
    },
    Ids(Vec<u64>),
}

/// Formal record search. [`MatchMode::Wildcard`] is the fuzzy search: `*`
/// matches any run of characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub tenant: String,
    pub data_id: Option<String>,
    pub group: Option<String>,
    pub app_name: Option<String>,
    pub mode: MatchMode,
}

impl From<SearchQuery> for RecordFilter {
    fn from(q: SearchQuery) -> Self {
        RecordFilter {
            tenant: q.tenant,
            data_id: q.data_id,
            group: q.group,
            app_name: q.app_name,
            mode: q.mode,
        }
    }
}

pub struct ConfigService {
    store: Arc<dyn ConfigStore>,
    resolver: Arc<VariantResolver>,
    long_poll: LongPollManager,
    batch: BatchCoordinator,
    long_poll_config: LongPollConfig,
}

impl std::fmt::Debug for ConfigService {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ConfigService")
            .field("long_poll", &self.long_poll)
            .finish_non_exhaustive()
    }
}

impl ConfigService {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        settings: &Settings,
    ) -> Self {
        let bus = Arc::new(ChangeEventBus::new());
        let resolver = Arc::new(VariantResolver::new(store.clone(), bus.clone(), &settings.mutation));
        let long_poll = LongPollManager::new(resolver.clone(), bus, &settings.long_poll);
        Self {
            store,
            batch: BatchCoordinator::new(resolver.clone()),
            resolver,
            long_poll,
            long_poll_config: settings.long_poll.clone(),
        }
    }

    pub fn long_poll(&self) -> &LongPollManager {
        &self.long_poll
    }

    pub fn long_poll_config(&self) -> &LongPollConfig {
        &self.long_poll_config
    }

    pub async fn publish(
        &self,
        request: PublishRequest,
    ) -> Result<ConfigRecord> {
        let mutation = Mutation::Publish {
            content: request.content,
            app_name: request.app_name,
            content_type: request.content_type,
            advance: request.advance,
        };
        match self.resolver.mutate(&request.key, request.variant, mutation).await? {
            MutationOutcome::Published(record) => {
                info!(key = %record.key, variant = %record.selector(), id = record.id, "config published");
                Ok(record)
            }
            MutationOutcome::Deleted(_) => Err(Error::Conflict(format!(
                "publish of {} produced a delete",
                request.key
            ))),
        }
    }

    /// Record stored in exactly the given slot
    pub async fn get(
        &self,
        key: &ConfigKey,
        selector: &VariantSelector,
    ) -> Result<ConfigRecord> {
        key.validate()?;
        self.store
            .get(key, selector)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{key} ({selector})")))
    }

    /// Record this requester should see (beta, then tag, then formal)
    pub async fn get_for_client(
        &self,
        key: &ConfigKey,
        client_ip: Option<IpAddr>,
        tag: Option<&str>,
    ) -> Result<ConfigRecord> {
        key.validate()?;
        self.resolver
            .resolve(key, client_ip, tag)
            .await?
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// Formal record with every stored field, including advance info
    pub async fn detail(
        &self,
        key: &ConfigKey,
    ) -> Result<ConfigRecord> {
        self.get(key, &VariantSelector::Formal).await
    }

    /// Metadata of the formal record, without content
    pub async fn catalog(
        &self,
        key: &ConfigKey,
    ) -> Result<ConfigCatalog> {
        self.detail(key).await.map(ConfigCatalog::from)
    }

    pub async fn get_beta(
        &self,
        key: &ConfigKey,
    ) -> Result<ConfigRecord> {
        self.get(key, &VariantSelector::Beta).await
    }

    /// Deleting an empty slot succeeds with `None`.
    pub async fn delete(
        &self,
        key: &ConfigKey,
        selector: &VariantSelector,
    ) -> Result<Option<ConfigRecord>> {
        let variant = match selector {
            VariantSelector::Formal => Variant::Formal,
            VariantSelector::Beta => Variant::beta([]),
            VariantSelector::Tag(label) => Variant::tag(label.clone()),
        };
        match self.resolver.mutate(key, variant, Mutation::Delete).await? {
            MutationOutcome::Deleted(removed) => {
                if removed.is_some() {
                    info!(key = %key, variant = %selector, "config deleted");
                }
                Ok(removed)
            }
            MutationOutcome::Published(_) => Err(Error::Conflict(format!("delete of {key} produced a publish"))),
        }
    }

    /// Ends a beta rollout; allowlisted clients fall back to formal.
    pub async fn stop_beta(
        &self,
        key: &ConfigKey,
    ) -> Result<Option<ConfigRecord>> {
        self.delete(key, &VariantSelector::Beta).await
    }

    /// Deletes formal records by id, one change event per removed record.
    pub async fn delete_by_ids(
        &self,
        ids: &[u64],
    ) -> Result<Vec<ConfigRecord>> {
        if ids.is_empty() {
            return Err(Error::Validation("ids must not be empty".into()));
        }
        let mut removed = Vec::new();
        for record in self.store.find_by_ids(ids).await? {
            if let Some(r) = self.delete(&record.key, &VariantSelector::Formal).await? {
                removed.push(r);
            }
        }
        info!(requested = ids.len(), removed = removed.len(), "configs deleted by id");
        Ok(removed)
    }

    /// `{client ip → declared digest}` of the clients waiting on `key`.
    ///
    /// With `sample_times > 1` the index is read that many times,
    /// `long_poll.listener_sample_interval_ms` apart, and merged so that
    /// clients between two polls are not missed.
    pub async fn list_listeners(
        &self,
        key: &ConfigKey,
        sample_times: usize,
    ) -> Result<HashMap<String, String>> {
        key.validate()?;
        let samples = sample_times.max(1);
        let interval = self.long_poll_config.listener_sample_interval();

        let mut merged = HashMap::new();
        for i in 0..samples {
            if i > 0 {
                tokio::time::sleep(interval).await;
            }
            merged.extend(self.long_poll.listeners(key));
        }
        debug!(key = %key, samples, listeners = merged.len(), "listeners sampled");
        Ok(merged)
    }

    pub async fn poll(
        &self,
        request: PollRequest,
    ) -> Result<PollResponse> {
        self.long_poll.poll(request).await
    }

    /// Hold time for a client declaring `client_timeout_ms`; `None` means
    /// no suspension.
    pub fn hold_for(
        &self,
        client_timeout_ms: Option<u64>,
        no_hangup: bool,
    ) -> Duration {
        match client_timeout_ms {
            Some(ms) if !no_hangup => self.long_poll_config.hold_for_client_timeout(ms),
            _ => Duration::ZERO,
        }
    }

    pub async fn export(
        &self,
        filter: ExportFilter,
    ) -> Result<Archive> {
        let records = match filter {
            ExportFilter::Ids(ids) => self.store.find_by_ids(&ids).await?,
            ExportFilter::Pattern {
                tenant,
                data_id,
                group,
                app_name,
            } => {
                self.store
                    .list(&RecordFilter {
                        tenant,
                        data_id,
                        group,
                        app_name,
                        mode: MatchMode::Exact,
                    })
                    .await?
            }
        };
        info!(records = records.len(), "configs exported");
        Ok(Archive::from_records(&records))
    }

    /// Publishes every item of `archive` into `namespace` (default when
    /// blank).
    pub async fn import(
        &self,
        archive: Archive,
        namespace: Option<&str>,
        policy: ConflictPolicy,
    ) -> Result<BatchResult> {
        let tenant = self.target_tenant(namespace.unwrap_or_default()).await?;
        let items = archive.into_batch(&tenant)?;
        info!(tenant = %tenant, items = items.len(), %policy, "importing archive");
        Ok(self.batch.apply_batch(items, policy).await)
    }

    /// Copies the formal records `ids` into `namespace`.
    pub async fn clone_configs(
        &self,
        ids: &[u64],
        namespace: &str,
        policy: ConflictPolicy,
    ) -> Result<BatchResult> {
        let tenant = self.target_tenant(namespace).await?;
        let records = self.store.find_by_ids(ids).await?;
        if records.is_empty() {
            return Err(Error::Validation("no config selected for clone".into()));
        }

        let items: Vec<BatchItem> = records
            .into_iter()
            .map(|r| {
                let mut item = BatchItem::from(r);
                item.key = item.key.with_tenant(tenant.clone());
                item
            })
            .collect();
        info!(tenant = %tenant, items = items.len(), %policy, "cloning configs");
        Ok(self.batch.apply_batch(items, policy).await)
    }

    pub async fn search(
        &self,
        query: SearchQuery,
        page_no: usize,
        page_size: usize,
    ) -> Result<Page<ConfigRecord>> {
        self.store.search(&query.into(), page_no, page_size).await
    }

    /// Namespace writes land in; `public` (any case) is the default one.
    async fn target_tenant(
        &self,
        namespace: &str,
    ) -> Result<String> {
        let namespace = namespace.trim();
        if namespace.is_empty() || namespace.eq_ignore_ascii_case(PUBLIC_NAMESPACE) {
            return Ok(String::new());
        }
        if !self.store.namespace_exists(namespace).await? {
            warn!(namespace, "target namespace does not exist");
            return Err(Error::Namespace(namespace.to_string()));
        }
        Ok(namespace.to_string())
    }

    /// Answers every waiting listener and stops suspending new ones.
    pub fn shutdown(&self) {
        self.long_poll.shutdown();
    }
}
