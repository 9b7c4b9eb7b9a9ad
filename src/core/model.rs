//! Identity and record types shared by every component.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use serde::Deserialize;
use serde::Serialize;

use super::digest::digest_of;
use crate::constants::MAX_CONFIG_TAGS;
use crate::constants::MAX_CONFIG_TAG_LEN;
use crate::constants::MAX_DATA_ID_LEN;
use crate::constants::MAX_DESC_LEN;
use crate::constants::MAX_EFFECT_LEN;
use crate::constants::MAX_GROUP_LEN;
use crate::constants::MAX_SCHEMA_LEN;
use crate::constants::MAX_TAG_LEN;
use crate::constants::MAX_TENANT_LEN;
use crate::constants::MAX_TYPE_LEN;
use crate::constants::MAX_USE_LEN;
use crate::Error;
use crate::Result;

/// `{dataId, group, tenant}` identity of a configuration item.
///
/// Tenant is also called namespace; the empty tenant is the default one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigKey {
    pub data_id: String,
    pub group: String,
    #[serde(default)]
    pub tenant: String,
}

impl ConfigKey {
    pub fn new(
        data_id: impl Into<String>,
        group: impl Into<String>,
        tenant: impl Into<String>,
    ) -> Self {
        Self {
            data_id: data_id.into(),
            group: group.into(),
            tenant: tenant.into(),
        }
    }

    /// Rejects keys the store could not round-trip through the listener
    /// wire format or archive item names.
    pub fn validate(&self) -> Result<()> {
        check_identifier("dataId", &self.data_id, MAX_DATA_ID_LEN)?;
        check_identifier("group", &self.group, MAX_GROUP_LEN)?;
        if !self.tenant.is_empty() {
            check_identifier("tenant", &self.tenant, MAX_TENANT_LEN)?;
        }
        Ok(())
    }

    /// Same key moved to another namespace
    pub fn with_tenant(
        &self,
        tenant: impl Into<String>,
    ) -> Self {
        Self {
            data_id: self.data_id.clone(),
            group: self.group.clone(),
            tenant: tenant.into(),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.tenant.is_empty() {
            write!(f, "{}+{}", self.data_id, self.group)
        } else {
            write!(f, "{}+{}+{}", self.data_id, self.group, self.tenant)
        }
    }
}

pub(crate) fn validate_tag(label: &str) -> Result<()> {
    check_identifier("tag", label, MAX_TAG_LEN)
}

fn check_identifier(
    field: &str,
    value: &str,
    max_len: usize,
) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    if value.len() > max_len {
        return Err(Error::Validation(format!(
            "{field} exceeds {max_len} bytes (got {})",
            value.len()
        )));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
    {
        return Err(Error::Validation(format!("{field} contains illegal character {c:?}")));
    }
    Ok(())
}

/// Which version of a key a record holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    Formal,
    /// Visible only to the listed client addresses
    Beta { ips: BTreeSet<IpAddr> },
    /// Visible only when the client asks for `label`
    Tag { label: String },
}

impl Variant {
    pub fn selector(&self) -> VariantSelector {
        match self {
            Variant::Formal => VariantSelector::Formal,
            Variant::Beta { .. } => VariantSelector::Beta,
            Variant::Tag { label } => VariantSelector::Tag(label.clone()),
        }
    }

    pub fn tag(label: impl Into<String>) -> Self {
        Variant::Tag { label: label.into() }
    }

    pub fn beta<I: IntoIterator<Item = IpAddr>>(ips: I) -> Self {
        Variant::Beta {
            ips: ips.into_iter().collect(),
        }
    }
}

/// Slot a record occupies under its key; a [`Variant`] without payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariantSelector {
    Formal,
    Beta,
    Tag(String),
}

impl fmt::Display for VariantSelector {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            VariantSelector::Formal => f.write_str("formal"),
            VariantSelector::Beta => f.write_str("beta"),
            VariantSelector::Tag(label) => write!(f, "tag:{label}"),
        }
    }
}

/// Descriptive fields stored with a formal record. They never take part in
/// the digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceInfo {
    pub description: Option<String>,
    /// What the item is used for (`use` on the wire)
    pub usage: Option<String>,
    pub effect: Option<String>,
    pub schema: Option<String>,
    #[serde(default)]
    pub config_tags: Vec<String>,
}

impl AdvanceInfo {
    /// Splits a comma separated `config_tags` parameter, dropping blanks.
    pub fn parse_config_tags(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        check_len("desc", self.description.as_deref(), MAX_DESC_LEN)?;
        check_len("use", self.usage.as_deref(), MAX_USE_LEN)?;
        check_len("effect", self.effect.as_deref(), MAX_EFFECT_LEN)?;
        check_len("schema", self.schema.as_deref(), MAX_SCHEMA_LEN)?;
        if self.config_tags.len() > MAX_CONFIG_TAGS {
            return Err(Error::Validation(format!(
                "at most {MAX_CONFIG_TAGS} config_tags allowed (got {})",
                self.config_tags.len()
            )));
        }
        for tag in &self.config_tags {
            check_len("config_tags", Some(tag), MAX_CONFIG_TAG_LEN)?;
        }
        Ok(())
    }
}

/// Rejects an optional free-text value longer than `max_len` bytes.
pub(crate) fn check_len(
    field: &str,
    value: Option<&str>,
    max_len: usize,
) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if value.len() > max_len {
        return Err(Error::Validation(format!(
            "{field} exceeds {max_len} bytes (got {})",
            value.len()
        )));
    }
    Ok(())
}

/// App names travel as one line of the archive manifest.
pub(crate) fn validate_app_name(app_name: Option<&str>) -> Result<()> {
    match app_name {
        Some(name) if name.contains(['\r', '\n']) => {
            Err(Error::Validation("appName must not contain line breaks".into()))
        }
        _ => Ok(()),
    }
}

pub(crate) fn validate_content_type(content_type: Option<&str>) -> Result<()> {
    check_len("type", content_type, MAX_TYPE_LEN)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    /// Store-assigned identifier, 0 until persisted
    pub id: u64,
    pub key: ConfigKey,
    pub variant: Variant,
    pub content: String,
    /// Fingerprint of `content`, kept in sync by [`ConfigRecord::set_content`]
    pub digest: String,
    pub app_name: Option<String>,
    pub content_type: Option<String>,
    #[serde(default)]
    pub advance: AdvanceInfo,
    /// Set by the store on first insert, kept across updates
    #[serde(default)]
    pub created_ms: u64,
    pub last_modified_ms: u64,
}

impl ConfigRecord {
    pub fn new(
        key: ConfigKey,
        variant: Variant,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            id: 0,
            key,
            variant,
            digest: digest_of(&content),
            content,
            app_name: None,
            content_type: None,
            advance: AdvanceInfo::default(),
            created_ms: 0,
            last_modified_ms: 0,
        }
    }

    pub fn with_app_name(
        mut self,
        app_name: Option<String>,
    ) -> Self {
        self.app_name = app_name.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_content_type(
        mut self,
        content_type: Option<String>,
    ) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_advance(
        mut self,
        advance: AdvanceInfo,
    ) -> Self {
        self.advance = advance;
        self
    }

    pub fn set_content(
        &mut self,
        content: impl Into<String>,
    ) {
        self.content = content.into();
        self.digest = digest_of(&self.content);
    }

    pub fn selector(&self) -> VariantSelector {
        self.variant.selector()
    }
}

/// Metadata of a formal record without its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigCatalog {
    pub key: ConfigKey,
    pub app_name: Option<String>,
    pub content_type: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "use")]
    pub usage: Option<String>,
    pub effect: Option<String>,
    pub schema: Option<String>,
    pub config_tags: Vec<String>,
    pub created_ms: u64,
    pub last_modified_ms: u64,
}

impl From<ConfigRecord> for ConfigCatalog {
    fn from(record: ConfigRecord) -> Self {
        let AdvanceInfo {
            description,
            usage,
            effect,
            schema,
            config_tags,
        } = record.advance;
        Self {
            key: record.key,
            app_name: record.app_name,
            content_type: record.content_type,
            description,
            usage,
            effect,
            schema,
            config_tags,
            created_ms: record.created_ms,
            last_modified_ms: record.last_modified_ms,
        }
    }
}
