use config::ConfigError;
use serde::Deserialize;

use crate::Error;
use crate::Result;

/// Responder-side settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Buffered payload size (in bytes) at which an in-progress readout is
    /// cut into a chunk and pushed to the requesting peer.
    #[serde(default = "default_partition_threshold")]
    pub partition_threshold: usize,

    /// Maximum number of readout jobs running concurrently for all peers.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

fn default_partition_threshold() -> usize {
    crate::constants::DEFAULT_PARTITION_THRESHOLD
}

fn default_max_concurrent_jobs() -> usize {
    16
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            partition_threshold: default_partition_threshold(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.partition_threshold == 0 {
            return Err(Error::Config(ConfigError::Message(
                "server.partition_threshold must be greater than zero".into(),
            )));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "server.max_concurrent_jobs must be greater than zero".into(),
            )));
        }
        Ok(())
    }
}
