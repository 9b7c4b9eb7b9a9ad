//! Export/import archive layout.
//!
//! An archive is a flat list of named items. Each configuration is stored
//! under `<group>/<dataId>`; app names travel in a `.meta.yml` manifest with
//! one `<group>.<dataId with last '.' as '~'>.app=<appName>` line per record.
//! Packing the items into a zip file is left to the caller.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::BatchItem;
use super::ConfigKey;
use super::ConfigRecord;
use crate::constants::ARCHIVE_META_APP_SUFFIX;
use crate::constants::ARCHIVE_META_DOT_REPLACEMENT;
use crate::constants::ARCHIVE_META_ITEM;
use crate::constants::ARCHIVE_META_LINE_SEPARATOR;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveItem {
    pub name: String,
    pub data: String,
}

impl ArchiveItem {
    pub fn new(
        name: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    pub items: Vec<ArchiveItem>,
}

impl Archive {
    pub fn new(items: Vec<ArchiveItem>) -> Self {
        Self { items }
    }

    /// Builds the export archive for `records`. The manifest is appended
    /// only when at least one record has an app name.
    pub fn from_records(records: &[ConfigRecord]) -> Self {
        let mut manifest = String::new();
        let mut items = Vec::with_capacity(records.len() + 1);

        for record in records {
            if let Some(app) = record.app_name.as_deref() {
                manifest.push_str(&manifest_key(&record.key.group, &record.key.data_id));
                manifest.push('=');
                manifest.push_str(app);
                manifest.push_str(ARCHIVE_META_LINE_SEPARATOR);
            }
            items.push(ArchiveItem::new(
                format!("{}/{}", record.key.group, record.key.data_id),
                record.content.clone(),
            ));
        }

        if !manifest.is_empty() {
            items.push(ArchiveItem::new(ARCHIVE_META_ITEM, manifest));
        }
        Self { items }
    }

    /// Parses the archive into formal writes targeting `tenant`.
    ///
    /// The whole archive is rejected if the manifest or any item name is
    /// malformed, or if it holds no configuration item.
    pub fn into_batch(
        self,
        tenant: &str,
    ) -> Result<Vec<BatchItem>> {
        let (meta, entries): (Vec<_>, Vec<_>) = self
            .items
            .into_iter()
            .partition(|item| item.name == ARCHIVE_META_ITEM);

        let apps = match meta.first() {
            Some(item) => parse_manifest(&item.data)?,
            None => HashMap::new(),
        };

        if entries.is_empty() {
            return Err(Error::Validation("archive contains no config items".into()));
        }

        entries
            .into_iter()
            .map(|item| {
                let (group, data_id) = split_item_name(&item.name)?;
                let app_name = apps.get(&manifest_key(group, data_id)).cloned();
                let mut batch_item = BatchItem::new(ConfigKey::new(data_id, group, tenant), item.data);
                batch_item.app_name = app_name;
                Ok(batch_item)
            })
            .collect()
    }
}

fn manifest_key(
    group: &str,
    data_id: &str,
) -> String {
    let data_id = match data_id.rfind('.') {
        Some(pos) => format!("{}{}{}", &data_id[..pos], ARCHIVE_META_DOT_REPLACEMENT, &data_id[pos + 1..]),
        None => data_id.to_string(),
    };
    format!("{group}.{data_id}{ARCHIVE_META_APP_SUFFIX}")
}

fn parse_manifest(data: &str) -> Result<HashMap<String, String>> {
    let mut apps = HashMap::new();
    for line in data.split(ARCHIVE_META_LINE_SEPARATOR).filter(|l| !l.is_empty()) {
        // Keys never contain `=`, app names may
        match line.split_once('=') {
            Some((key, app)) if !key.is_empty() => {
                apps.insert(key.to_string(), app.to_string());
            }
            _ => {
                debug!(line, "illegal manifest line");
                return Err(Error::Validation(format!("illegal metadata line {line:?}")));
            }
        }
    }
    Ok(apps)
}

fn split_item_name(name: &str) -> Result<(&str, &str)> {
    let parts: Vec<&str> = name.split('/').collect();
    match parts.as_slice() {
        [group, data_id] if !group.is_empty() && !data_id.is_empty() => Ok((*group, *data_id)),
        _ => Err(Error::Validation(format!(
            "archive item {name:?} is not named group/dataId"
        ))),
    }
}
