use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use figment::providers::Format as _;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};

mod args;
pub use args::Args;

#[cfg(test)]
mod tests;

/// `Settings` are the configurable options for running the update agent.
///
/// The only entry point to construct `Settings` is `Settings::get`.
#[serde_as]
#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    /// Address of the update server.
    pub server_address: String,
    /// Product this device belongs to, as known by the server.
    pub product_uid: String,
    /// Identity reported to the server on probes.
    pub device_id: String,
    /// Hardware identifier matched against `supported-hardware` in update
    /// metadata.
    pub hardware: String,
    /// Which installation set of a package applies to this device.
    #[serde(default)]
    pub installation_set: usize,
    #[serde_as(as = "DurationSeconds")]
    #[serde(default = "default_polling_interval")]
    pub polling_interval: Duration,
    /// Pause between object downloads, mostly to smooth out bandwidth use.
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(default = "default_download_delay")]
    pub download_delay: Duration,
    #[serde(default = "default_downloads")]
    pub downloads: PathBuf,
    /// Where the agent persists which package it installed last.
    #[serde(default = "default_runtime_state")]
    pub runtime_state: PathBuf,
    #[serde(default)]
    pub nodbus: bool,
    #[serde(default)]
    pub noupdate: bool,
}

fn default_polling_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_download_delay() -> Duration {
    Duration::ZERO
}

fn default_downloads() -> PathBuf {
    PathBuf::from("/var/lib/ota-update-agent/downloads")
}

fn default_runtime_state() -> PathBuf {
    PathBuf::from("/var/lib/ota-update-agent/state.json")
}

impl Settings {
    /// Constructs `Settings` from a config file, environment variables, and command line
    /// arguments. Command line arguments always take precedence over environment variables, which
    /// in turn take precedence over the config file.
    pub fn get<P: AsRef<Path>>(
        args: &Args,
        config: P,
        env_prefix: &str,
    ) -> figment::error::Result<Settings> {
        figment::Figment::new()
            .merge(figment::providers::Toml::file(config))
            .merge(figment::providers::Env::prefixed(env_prefix))
            .merge(figment::providers::Serialized::defaults(args))
            .extract()
    }
}
