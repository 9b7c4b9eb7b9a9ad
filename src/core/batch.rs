//! Batch Mutation Coordinator
//!
//! Applies many formal writes (import, clone) under one conflict policy.
//! There is no cross-record transaction: every record succeeds or fails on
//! its own and each success emits its own change event.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use tracing::info;

use super::AdvanceInfo;
use super::ConfigKey;
use super::ConfigRecord;
use super::Mutation;
use super::Variant;
use super::VariantResolver;
use super::VariantSelector;
use crate::Error;
use crate::ErrorKind;
use crate::Result;
use crate::BATCH_RECORDS;

/// What to do when a destination key already has a formal record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictPolicy {
    /// Write nothing at all if any destination exists or cannot be checked
    #[default]
    Abort,
    /// Leave existing destinations untouched
    Skip,
    Overwrite,
}

impl FromStr for ConflictPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ABORT" => Ok(ConflictPolicy::Abort),
            "SKIP" => Ok(ConflictPolicy::Skip),
            "OVERWRITE" => Ok(ConflictPolicy::Overwrite),
            _ => Err(Error::Validation(format!("unknown conflict policy {s:?}"))),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ConflictPolicy::Abort => f.write_str("ABORT"),
            ConflictPolicy::Skip => f.write_str("SKIP"),
            ConflictPolicy::Overwrite => f.write_str("OVERWRITE"),
        }
    }
}

/// One formal record to write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub key: ConfigKey,
    pub content: String,
    pub app_name: Option<String>,
    pub content_type: Option<String>,
    pub advance: AdvanceInfo,
}

impl BatchItem {
    pub fn new(
        key: ConfigKey,
        content: impl Into<String>,
    ) -> Self {
        Self {
            key,
            content: content.into(),
            app_name: None,
            content_type: None,
            advance: AdvanceInfo::default(),
        }
    }

    fn mutation(self) -> Mutation {
        Mutation::Publish {
            content: self.content,
            app_name: self.app_name,
            content_type: self.content_type,
            advance: self.advance,
        }
    }
}

impl From<ConfigRecord> for BatchItem {
    fn from(record: ConfigRecord) -> Self {
        Self {
            key: record.key,
            content: record.content,
            app_name: record.app_name,
            content_type: record.content_type,
            advance: record.advance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub key: ConfigKey,
    pub kind: ErrorKind,
    pub message: String,
}

impl BatchFailure {
    fn new(
        key: ConfigKey,
        error: &Error,
    ) -> Self {
        Self {
            key,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Per-record outcome of a batch. A partially failed batch is still `Ok`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub succeeded: Vec<ConfigKey>,
    pub skipped: Vec<ConfigKey>,
    pub failed: Vec<BatchFailure>,
    /// Set when an `Abort` batch found conflicts and wrote nothing
    pub aborted: bool,
}

impl BatchResult {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    fn fail(
        &mut self,
        key: ConfigKey,
        error: &Error,
    ) {
        debug!(key = %key, "batch record failed: {}", error);
        self.failed.push(BatchFailure::new(key, error));
    }

    fn observe(&self) {
        BATCH_RECORDS
            .with_label_values(&["succeeded"])
            .inc_by(self.succeeded.len() as u64);
        BATCH_RECORDS
            .with_label_values(&["skipped"])
            .inc_by(self.skipped.len() as u64);
        BATCH_RECORDS
            .with_label_values(&["failed"])
            .inc_by(self.failed.len() as u64);
    }
}

#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    resolver: Arc<VariantResolver>,
}

impl BatchCoordinator {
    pub fn new(resolver: Arc<VariantResolver>) -> Self {
        Self { resolver }
    }

    /// Writes `items` as formal records under `policy`.
    pub async fn apply_batch(
        &self,
        items: Vec<BatchItem>,
        policy: ConflictPolicy,
    ) -> BatchResult {
        let mut result = BatchResult::default();
        let total = items.len();

        let items = match policy {
            ConflictPolicy::Abort => {
                let (clear, conflicts) = self.partition_existing(items, &mut result).await;
                // A destination whose existence could not be checked counts
                // as a conflict: nothing is written.
                let unchecked = result.failed.len();
                if !conflicts.is_empty() || unchecked > 0 {
                    for key in conflicts {
                        let error = Error::Conflict(format!("{key} already exists"));
                        result.fail(key, &error);
                    }
                    result.aborted = true;
                    info!(
                        total,
                        conflicts = result.failed.len() - unchecked,
                        unchecked,
                        "batch aborted"
                    );
                    result.observe();
                    return result;
                }
                clear
            }
            ConflictPolicy::Skip => {
                // Checked one by one so a duplicate later in the batch sees
                // the earlier write.
                for item in items {
                    match self.resolver.exists(&item.key, &VariantSelector::Formal).await {
                        Ok(true) => result.skipped.push(item.key),
                        Ok(false) => self.write(item, &mut result).await,
                        Err(e) => result.fail(item.key, &e),
                    }
                }
                Vec::new()
            }
            ConflictPolicy::Overwrite => items,
        };

        for item in items {
            self.write(item, &mut result).await;
        }

        info!(
            total,
            %policy,
            succeeded = result.succeeded.len(),
            skipped = result.skipped.len(),
            failed = result.failed.len(),
            "batch applied"
        );
        result.observe();
        result
    }

    /// Splits items into those whose destination is free and the keys that
    /// already exist. Existence-check failures are recorded in `result`.
    async fn partition_existing(
        &self,
        items: Vec<BatchItem>,
        result: &mut BatchResult,
    ) -> (Vec<BatchItem>, Vec<ConfigKey>) {
        let mut clear = Vec::with_capacity(items.len());
        let mut conflicts = Vec::new();
        for item in items {
            match self.resolver.exists(&item.key, &VariantSelector::Formal).await {
                Ok(true) => conflicts.push(item.key),
                Ok(false) => clear.push(item),
                Err(e) => result.fail(item.key, &e),
            }
        }
        (clear, conflicts)
    }

    async fn write(
        &self,
        item: BatchItem,
        result: &mut BatchResult,
    ) {
        let key = item.key.clone();
        match self.resolver.mutate(&key, Variant::Formal, item.mutation()).await {
            Ok(_) => result.succeeded.push(key),
            Err(e) => result.fail(key, &e),
        }
    }
}
