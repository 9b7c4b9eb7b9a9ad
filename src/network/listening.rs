//! Listener wire format.
//!
//! Request body field `Listening-Configs` holds one record per watched key,
//! each terminated by `\u{1}`, fields separated by `\u{2}`:
//!
//! ```text
//! dataId ␂ group ␂ digest ␁               (default tenant)
//! dataId ␂ group ␂ digest ␂ tenant ␁
//! ```
//!
//! The response lists changed keys in the same framing without the digest.

use std::collections::BTreeMap;

use crate::constants::LINE_SEPARATOR;
use crate::constants::WORD_SEPARATOR;
use crate::ConfigKey;
use crate::Error;
use crate::Result;

/// Decodes a watch set. A repeated key keeps its last digest.
pub fn parse_listening_configs(raw: &str) -> Result<BTreeMap<ConfigKey, String>> {
    let mut watch_set = BTreeMap::new();
    for record in raw.split(LINE_SEPARATOR).filter(|r| !r.is_empty()) {
        let fields: Vec<&str> = record.split(WORD_SEPARATOR).collect();
        let (key, digest) = match fields.as_slice() {
            [data_id, group, digest] => (ConfigKey::new(*data_id, *group, ""), *digest),
            [data_id, group, digest, tenant] => (ConfigKey::new(*data_id, *group, *tenant), *digest),
            _ => {
                return Err(Error::Validation(format!(
                    "malformed listening record with {} fields",
                    fields.len()
                )))
            }
        };
        key.validate()?;
        watch_set.insert(key, digest.to_string());
    }

    if watch_set.is_empty() {
        return Err(Error::Validation("Listening-Configs is empty".into()));
    }
    Ok(watch_set)
}

/// Encodes a watch set; used by clients and tests.
pub fn encode_listening_configs(watch_set: &BTreeMap<ConfigKey, String>) -> String {
    let mut out = String::new();
    for (key, digest) in watch_set {
        out.push_str(&key.data_id);
        out.push(WORD_SEPARATOR);
        out.push_str(&key.group);
        out.push(WORD_SEPARATOR);
        out.push_str(digest);
        if !key.tenant.is_empty() {
            out.push(WORD_SEPARATOR);
            out.push_str(&key.tenant);
        }
        out.push(LINE_SEPARATOR);
    }
    out
}

pub fn encode_changed_keys(keys: &[ConfigKey]) -> String {
    let mut out = String::new();
    for key in keys {
        out.push_str(&key.data_id);
        out.push(WORD_SEPARATOR);
        out.push_str(&key.group);
        if !key.tenant.is_empty() {
            out.push(WORD_SEPARATOR);
            out.push_str(&key.tenant);
        }
        out.push(LINE_SEPARATOR);
    }
    out
}

/// Inverse of [`encode_changed_keys`].
pub fn parse_changed_keys(raw: &str) -> Result<Vec<ConfigKey>> {
    raw.split(LINE_SEPARATOR)
        .filter(|r| !r.is_empty())
        .map(|record| {
            let fields: Vec<&str> = record.split(WORD_SEPARATOR).collect();
            match fields.as_slice() {
                [data_id, group] => Ok(ConfigKey::new(*data_id, *group, "")),
                [data_id, group, tenant] => Ok(ConfigKey::new(*data_id, *group, *tenant)),
                _ => Err(Error::Validation(format!("malformed changed-key record {record:?}"))),
            }
        })
        .collect()
}
