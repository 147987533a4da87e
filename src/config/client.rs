use config::ConfigError;
use serde::Deserialize;

use crate::Error;
use crate::Result;

/// Requester-side settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Seconds an outstanding readout may go without traffic before it is
    /// marked timed out. Subscriptions are exempt.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// How often (in milliseconds) the timeout sweep runs while readouts
    /// are outstanding.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_sweep_interval_ms() -> u64 {
    crate::constants::TIMEOUT_SWEEP_INTERVAL_MS
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            default_timeout_secs: default_timeout_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "client.default_timeout_secs must be greater than zero".into(),
            )));
        }
        if self.sweep_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "client.sweep_interval_ms must be greater than zero".into(),
            )));
        }
        Ok(())
    }
}
