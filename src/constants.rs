// -
// Listener wire format

/// Separates the fields of one watched key: `dataId ␂ group ␂ digest [␂ tenant]`
pub const WORD_SEPARATOR: char = '\u{2}';
/// Terminates each watched key record
pub const LINE_SEPARATOR: char = '\u{1}';

// -
// HTTP headers

pub const LONG_POLLING_TIMEOUT_HEADER: &str = "Long-Pulling-Timeout";
pub const LONG_POLLING_NO_HANGUP_HEADER: &str = "Long-Pulling-Timeout-No-Hangup";
pub const BETA_IPS_HEADER: &str = "betaIps";
pub const CLIENT_ID_HEADER: &str = "Client-Id";
pub const CONFIG_TAG_HEADER: &str = "Config-Tag";
pub const CONTENT_DIGEST_HEADER: &str = "Content-Digest";
pub const LISTENING_CONFIGS_PARAM: &str = "Listening-Configs";

// -
// Namespaces

/// Alias accepted for the default (empty) tenant
pub const PUBLIC_NAMESPACE: &str = "public";

// -
// Archive layout

/// Manifest entry carrying app names of exported records
pub const ARCHIVE_META_ITEM: &str = ".meta.yml";
pub const ARCHIVE_META_LINE_SEPARATOR: &str = "\r\n";
/// Replaces the last `.` of a dataId inside manifest keys
pub const ARCHIVE_META_DOT_REPLACEMENT: char = '~';
pub const ARCHIVE_META_APP_SUFFIX: &str = ".app";

// -
// Key limits

pub(crate) const MAX_DATA_ID_LEN: usize = 256;
pub(crate) const MAX_GROUP_LEN: usize = 256;
pub(crate) const MAX_TENANT_LEN: usize = 128;
pub(crate) const MAX_TAG_LEN: usize = 64;

// -
// Advance info limits

pub(crate) const MAX_DESC_LEN: usize = 128;
pub(crate) const MAX_USE_LEN: usize = 32;
pub(crate) const MAX_EFFECT_LEN: usize = 32;
pub(crate) const MAX_TYPE_LEN: usize = 32;
pub(crate) const MAX_SCHEMA_LEN: usize = 32_768;
pub(crate) const MAX_CONFIG_TAGS: usize = 5;
pub(crate) const MAX_CONFIG_TAG_LEN: usize = 64;
