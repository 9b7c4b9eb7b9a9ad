//! Configuration management for the config center server.
//!
//! Settings are merged from several sources, later ones winning:
//! 1. Default values (hardcoded)
//! 2. `config/base` file, when present
//! 3. File named by the `CONFIG_PATH` environment variable
//! 4. Environment variables prefixed `DCONFIG__` (highest priority)
//!
//! [`Settings::with_override_config`] layers one more file on top of an
//! already loaded instance.

mod long_poll;
mod monitoring;
mod mutation;
mod server;
pub use long_poll::*;
pub use monitoring::*;
pub use mutation::*;
pub use server::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Listener address and log location
    #[serde(default)]
    pub server: ServerConfig,
    /// Session manager sizing and hold times
    #[serde(default)]
    pub long_poll: LongPollConfig,
    /// Write-path rules
    #[serde(default)]
    pub mutation: MutationConfig,
    /// Metrics and monitoring settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Settings {
    /// Load settings from defaults, config files and environment.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name("config/base").required(false));

        if let Ok(path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        let settings: Self = builder
            .add_source(
                Environment::with_prefix("DCONFIG")
                    .prefix_separator("__")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Merge one more file on top of the current values.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path).required(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.long_poll.validate()?;
        self.mutation.validate()?;
        self.monitoring.validate()?;
        Ok(())
    }
}
