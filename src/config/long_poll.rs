use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Long-poll session manager settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LongPollConfig {
    /// Maximum number of concurrently waiting sessions. Polls arriving
    /// over the limit are rejected with an overload error instead of queued.
    ///
    /// **Default**: 10000
    #[serde(default = "default_max_waiting_sessions")]
    pub max_waiting_sessions: usize,

    /// Subtracted from the client's declared socket timeout so the server
    /// always answers first.
    ///
    /// **Default**: 500ms
    #[serde(default = "default_response_margin_ms")]
    pub response_margin_ms: u64,

    /// Upper bound of the hold time derived from the client timeout
    ///
    /// **Default**: 120000ms
    #[serde(default = "default_max_hold_ms")]
    pub max_hold_ms: u64,

    /// Gap between samples when listing listeners with `sampleTime > 1`
    ///
    /// **Default**: 100ms
    #[serde(default = "default_listener_sample_interval_ms")]
    pub listener_sample_interval_ms: u64,

    /// Maximum number of keys one poll may watch
    ///
    /// **Default**: 3000
    #[serde(default = "default_max_keys_per_poll")]
    pub max_keys_per_poll: usize,
}

impl Default for LongPollConfig {
    fn default() -> Self {
        Self {
            max_waiting_sessions: default_max_waiting_sessions(),
            response_margin_ms: default_response_margin_ms(),
            max_hold_ms: default_max_hold_ms(),
            listener_sample_interval_ms: default_listener_sample_interval_ms(),
            max_keys_per_poll: default_max_keys_per_poll(),
        }
    }
}

impl LongPollConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_waiting_sessions == 0 {
            return Err(Error::InvalidConfig(
                "long_poll.max_waiting_sessions must be greater than 0".into(),
            ));
        }
        if self.max_hold_ms == 0 {
            return Err(Error::InvalidConfig("long_poll.max_hold_ms must be greater than 0".into()));
        }
        if self.max_keys_per_poll == 0 {
            return Err(Error::InvalidConfig(
                "long_poll.max_keys_per_poll must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Hold time for a client that declared `client_timeout_ms` as its
    /// socket timeout.
    ///
    /// Always ends `response_margin_ms` before the client gives up; a
    /// timeout within the margin gets no hold at all.
    pub fn hold_for_client_timeout(
        &self,
        client_timeout_ms: u64,
    ) -> Duration {
        let hold = client_timeout_ms
            .saturating_sub(self.response_margin_ms)
            .min(self.max_hold_ms);
        Duration::from_millis(hold)
    }

    pub fn listener_sample_interval(&self) -> Duration {
        Duration::from_millis(self.listener_sample_interval_ms)
    }
}

fn default_max_waiting_sessions() -> usize {
    10_000
}
fn default_response_margin_ms() -> u64 {
    500
}
fn default_max_hold_ms() -> u64 {
    120_000
}
fn default_listener_sample_interval_ms() -> u64 {
    100
}
fn default_max_keys_per_poll() -> usize {
    3000
}
