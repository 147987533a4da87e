//! Engine configuration.
//!
//! Loaded from an optional TOML file with environment variables on top
//! (prefix `READOUT`, `__` as section separator), so a deployment can tune
//! the engine without shipping a file at all.

mod client;
mod server;

pub use client::*;
pub use server::*;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::Result;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Responder-side tuning: job queue and chunk streaming
    #[serde(default)]
    pub server: ServerConfig,
    /// Requester-side tuning: correlation timeouts
    #[serde(default)]
    pub client: ClientConfig,
}

impl Settings {
    /// Loads configuration with priority: defaults, optional config file,
    /// `READOUT_CONFIG` file, environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder();

        match path {
            Some(path) => config = config.add_source(File::with_name(path).required(true)),
            None => config = config.add_source(File::with_name("config/readout").required(false)),
        }

        if let Ok(path) = env::var("READOUT_CONFIG") {
            config = config.add_source(File::with_name(&path));
        }

        config = config.add_source(
            Environment::with_prefix("READOUT")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.client.validate()?;
        Ok(())
    }
}
