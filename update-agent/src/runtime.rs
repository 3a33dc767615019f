//! Runtime bookkeeping shared by the states.
//!
//! Only the installed-package marker survives restarts; retry counters and
//! the server-requested extra poll live and die with the process.

use std::{
    fs::{self, File},
    path::PathBuf,
    time::Duration,
};

use eyre::WrapErr as _;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Default, Deserialize, Serialize)]
struct Persisted {
    /// `package_uid` of the last successfully installed package. Lets
    /// UpdateCheck ignore a package the server still offers but that is
    /// already on disk, waiting for its reboot.
    #[serde(rename = "installed-package")]
    installed_package: Option<String>,
}

#[derive(Debug)]
pub struct RuntimeState {
    path: PathBuf,
    persisted: Persisted,
    consecutive_transient_errors: u32,
    extra_poll: Option<Duration>,
}

impl RuntimeState {
    /// Loads the persisted state from `path`. A missing file is a fresh
    /// device; a corrupt file is discarded with a warning rather than keeping
    /// the agent from starting.
    pub fn load(path: PathBuf) -> Self {
        let persisted = match File::open(&path) {
            Ok(file) => crate::json::deserialize(file).unwrap_or_else(|e| {
                warn!(
                    "discarding corrupt runtime state at `{}`: {e:?}",
                    path.display(),
                );
                Persisted::default()
            }),
            Err(_) => Persisted::default(),
        };
        Self {
            path,
            persisted,
            consecutive_transient_errors: 0,
            extra_poll: None,
        }
    }

    pub fn installed_package(&self) -> Option<&str> {
        self.persisted.installed_package.as_deref()
    }

    pub fn record_installed_package(&mut self, package_uid: &str) -> eyre::Result<()> {
        self.persisted.installed_package = Some(package_uid.to_owned());
        self.store()
    }

    fn store(&self) -> eyre::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).wrap_err_with(|| {
                format!("failed creating `{}`", parent.display())
            })?;
        }
        serde_json::to_writer(
            &File::options()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)
                .wrap_err("failed opening runtime state file")?,
            &self.persisted,
        )
        .wrap_err("failed writing runtime state to file")?;
        Ok(())
    }

    pub fn record_transient_failure(&mut self) {
        self.consecutive_transient_errors =
            self.consecutive_transient_errors.saturating_add(1);
    }

    pub fn reset_transient_failures(&mut self) {
        self.consecutive_transient_errors = 0;
    }

    pub fn transient_failures(&self) -> u32 {
        self.consecutive_transient_errors
    }

    pub fn set_extra_poll(&mut self, extra_poll: Option<Duration>) {
        self.extra_poll = extra_poll;
    }

    pub fn take_extra_poll(&mut self) -> Option<Duration> {
        self.extra_poll.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_state_file_is_a_fresh_device() {
        let dir = tempfile::tempdir().unwrap();
        let state = RuntimeState::load(dir.path().join("state.json"));
        assert_eq!(state.installed_package(), None);
        assert_eq!(state.transient_failures(), 0);
    }

    #[test]
    fn installed_package_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = RuntimeState::load(path.clone());
        state.record_installed_package("deadbeef").unwrap();

        let reloaded = RuntimeState::load(path);
        assert_eq!(reloaded.installed_package(), Some("deadbeef"));
    }

    #[test]
    fn corrupt_state_files_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").unwrap();

        let state = RuntimeState::load(path);
        assert_eq!(state.installed_package(), None);
    }

    #[test]
    fn transient_failure_counter_is_process_local() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = RuntimeState::load(dir.path().join("state.json"));
        state.record_transient_failure();
        state.record_transient_failure();
        assert_eq!(state.transient_failures(), 2);
        state.reset_transient_failures();
        assert_eq!(state.transient_failures(), 0);
    }
}
