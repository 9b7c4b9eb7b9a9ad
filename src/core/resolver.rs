//! Variant Resolver
//!
//! Decides which of a key's formal, beta and tag records answers a request,
//! and is the single write path for records: every successful mutation
//! publishes its [`ChangeEvent`] before returning to the caller.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use super::model::validate_app_name;
use super::model::validate_content_type;
use super::model::validate_tag;
use super::AdvanceInfo;
use super::ChangeEvent;
use super::ChangeEventBus;
use super::ChangeKind;
use super::ConfigKey;
use super::ConfigRecord;
use super::Variant;
use super::VariantSelector;
use crate::utils::pattern::wildcard_match;
use crate::ConfigStore;
use crate::Error;
use crate::MutationConfig;
use crate::Result;
use crate::CONFIG_MUTATIONS;

/// Data ids owned by server-side aggregation; direct formal publish is
/// refused for them.
#[derive(Debug, Clone, Default)]
pub struct AggregationWhitelist {
    patterns: Vec<String>,
}

impl AggregationWhitelist {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    pub fn is_aggregated(
        &self,
        data_id: &str,
    ) -> bool {
        self.patterns.iter().any(|p| wildcard_match(p, data_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Publish {
        content: String,
        app_name: Option<String>,
        content_type: Option<String>,
        advance: AdvanceInfo,
    },
    Delete,
}

impl Mutation {
    pub fn publish(content: impl Into<String>) -> Self {
        Mutation::Publish {
            content: content.into(),
            app_name: None,
            content_type: None,
            advance: AdvanceInfo::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Published(ConfigRecord),
    /// `None` when there was nothing to delete (no event is emitted)
    Deleted(Option<ConfigRecord>),
}

pub struct VariantResolver {
    store: Arc<dyn ConfigStore>,
    bus: Arc<ChangeEventBus>,
    aggregation: AggregationWhitelist,
    max_content_bytes: usize,
}

impl std::fmt::Debug for VariantResolver {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("VariantResolver")
            .field("aggregation", &self.aggregation)
            .field("max_content_bytes", &self.max_content_bytes)
            .finish_non_exhaustive()
    }
}

impl VariantResolver {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        bus: Arc<ChangeEventBus>,
        config: &MutationConfig,
    ) -> Self {
        Self {
            store,
            bus,
            aggregation: AggregationWhitelist::new(config.aggregation_whitelist.clone()),
            max_content_bytes: config.max_content_bytes,
        }
    }

    /// Effective record for a requester, first match wins:
    /// 1. beta record whose allowlist contains `requester_ip`
    /// 2. tag record labelled `requested_tag`
    /// 3. formal record
    pub async fn resolve(
        &self,
        key: &ConfigKey,
        requester_ip: Option<IpAddr>,
        requested_tag: Option<&str>,
    ) -> Result<Option<ConfigRecord>> {
        if let Some(ip) = requester_ip {
            if let Some(beta) = self.store.get(key, &VariantSelector::Beta).await? {
                if matches!(&beta.variant, Variant::Beta { ips } if ips.contains(&ip)) {
                    return Ok(Some(beta));
                }
            }
        }

        if let Some(label) = requested_tag.filter(|t| !t.is_empty()) {
            let selector = VariantSelector::Tag(label.to_string());
            if let Some(tagged) = self.store.get(key, &selector).await? {
                return Ok(Some(tagged));
            }
        }

        self.store.get(key, &VariantSelector::Formal).await
    }

    pub async fn exists(
        &self,
        key: &ConfigKey,
        selector: &VariantSelector,
    ) -> Result<bool> {
        Ok(self.store.get(key, selector).await?.is_some())
    }

    /// Writes exactly one variant record and publishes the resulting
    /// [`ChangeEvent`] before returning.
    ///
    /// Validation and conflict errors are raised before any store call;
    /// store errors are returned as-is and emit no event.
    pub async fn mutate(
        &self,
        key: &ConfigKey,
        variant: Variant,
        mutation: Mutation,
    ) -> Result<MutationOutcome> {
        key.validate()?;
        if let Variant::Tag { label } = &variant {
            validate_tag(label)?;
        }

        match mutation {
            Mutation::Publish {
                content,
                app_name,
                content_type,
                advance,
            } => {
                self.check_publish(key, &variant, &content)?;
                validate_app_name(app_name.as_deref())?;
                validate_content_type(content_type.as_deref())?;
                advance.validate()?;

                let event_variant = match &variant {
                    Variant::Beta { ips } => {
                        // Clients dropped from the allowlist must hear about it too
                        let mut affected = ips.clone();
                        if let Some(Variant::Beta { ips: previous }) = self
                            .store
                            .get(key, &VariantSelector::Beta)
                            .await?
                            .map(|r| r.variant)
                        {
                            affected.extend(previous);
                        }
                        Variant::Beta { ips: affected }
                    }
                    other => other.clone(),
                };

                let record = ConfigRecord::new(key.clone(), variant, content)
                    .with_app_name(app_name)
                    .with_content_type(content_type)
                    .with_advance(advance);
                let stored = self.store.upsert(record).await?;

                self.emit(ChangeEvent::new(key.clone(), event_variant, ChangeKind::Publish));
                Ok(MutationOutcome::Published(stored))
            }
            Mutation::Delete => {
                let selector = variant.selector();
                let removed = self.store.remove(key, &selector).await?;
                match &removed {
                    Some(record) => {
                        self.emit(ChangeEvent::new(
                            key.clone(),
                            record.variant.clone(),
                            ChangeKind::Delete,
                        ));
                    }
                    None => debug!(key = %key, variant = %selector, "delete on empty slot"),
                }
                Ok(MutationOutcome::Deleted(removed))
            }
        }
    }

    fn check_publish(
        &self,
        key: &ConfigKey,
        variant: &Variant,
        content: &str,
    ) -> Result<()> {
        if content.is_empty() {
            return Err(Error::Validation("content must not be empty".into()));
        }
        if content.len() > self.max_content_bytes {
            return Err(Error::Validation(format!(
                "content exceeds {} bytes (got {})",
                self.max_content_bytes,
                content.len()
            )));
        }
        match variant {
            Variant::Beta { ips } if ips.is_empty() => {
                Err(Error::Validation("beta publish requires a non-empty ip allowlist".into()))
            }
            Variant::Formal if self.aggregation.is_aggregated(&key.data_id) => {
                warn!("[aggr-conflict] attempt to publish aggregated data id directly: {}", key);
                Err(Error::Conflict(format!("dataId:{} is aggr", key.data_id)))
            }
            _ => Ok(()),
        }
    }

    fn emit(
        &self,
        event: ChangeEvent,
    ) {
        let kind = match event.kind {
            ChangeKind::Publish => "publish",
            ChangeKind::Delete => "delete",
        };
        let variant = match &event.variant {
            Variant::Formal => "formal",
            Variant::Beta { .. } => "beta",
            Variant::Tag { .. } => "tag",
        };
        CONFIG_MUTATIONS.with_label_values(&[variant, kind]).inc();

        let delivered = self.bus.publish(&event);
        debug!(
            key = %event.key,
            variant,
            kind,
            timestamp_ms = event.timestamp_ms,
            delivered,
            "change event emitted"
        );
    }
}
