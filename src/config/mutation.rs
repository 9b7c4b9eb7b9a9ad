use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Write-path rules
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MutationConfig {
    /// Largest accepted content, in bytes
    ///
    /// **Default**: 10 MiB
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,

    /// Data id patterns (`*` wildcard) reserved for aggregation; direct
    /// formal publishes to them are refused.
    #[serde(default)]
    pub aggregation_whitelist: Vec<String>,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: default_max_content_bytes(),
            aggregation_whitelist: Vec::new(),
        }
    }
}

impl MutationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_content_bytes == 0 {
            return Err(Error::InvalidConfig(
                "mutation.max_content_bytes must be greater than 0".into(),
            ));
        }
        if self.aggregation_whitelist.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "mutation.aggregation_whitelist contains an empty pattern".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_content_bytes() -> usize {
    10 * 1024 * 1024
}
