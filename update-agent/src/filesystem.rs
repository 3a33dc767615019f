//! Privileged block-device operations: format, mount, umount, scratch dirs.
//!
//! Mounts happen inside a private mount namespace so that nothing the agent
//! does to the mount table can leak into the rest of the running device, even
//! if the agent is killed mid-operation. Failing to establish that isolation
//! is treated as process-fatal: continuing with a shared namespace could
//! corrupt the host's mount table.

use std::{
    env,
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::Command,
};

use nix::{
    mount::{mount, umount, MsFlags},
    sched::{unshare, CloneFlags},
};
use tracing::{debug, error};

/// Base path under which scratch directories are created.
const SCRATCH_BASE: &str = "/var/tmp";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("couldn't format `{device}`: fs type `{fs_type}` is not supported")]
    UnsupportedFsType { device: String, fs_type: String },
    #[error("couldn't format `{device}`: `{binary}` not found on the search path")]
    BinaryNotFound { device: String, binary: String },
    #[error("couldn't format `{device}`: cmdline error")]
    Format {
        device: String,
        #[source]
        source: io::Error,
    },
    #[error("couldn't mount `{device}`")]
    Mount {
        device: String,
        #[source]
        source: nix::Error,
    },
    #[error("couldn't umount `{}`", .path.display())]
    Umount {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
    #[error("couldn't create scratch directory under `{SCRATCH_BASE}`")]
    TempDir(#[source] io::Error),
}

impl Error {
    /// Whether retrying this operation later could possibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::UnsupportedFsType { .. } | Error::BinaryNotFound { .. }
        )
    }
}

/// Executes a format command line. Split out so tests can assert the exact
/// command lines without touching real devices.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    fn execute(&self, cmdline: &str) -> io::Result<()>;
}

/// Runs commands on the host system.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn execute(&self, cmdline: &str) -> io::Result<()> {
        let mut parts = cmdline.split_whitespace();
        let binary = parts
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "empty command line")
            })?;
        let output = Command::new(binary).args(parts).output()?;
        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "`{cmdline}` exited with `{:?}`: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr),
                ),
            ));
        }
        Ok(())
    }
}

/// The exact command line used to create `fs_type` on `device`.
///
/// Devices in the field depend on these exact invocations, argument order
/// included; do not normalize them.
fn cmdline_for_format(device: &str, fs_type: &str, options: &str) -> Option<String> {
    let parts: Vec<&str> = match fs_type {
        "jffs2" => vec!["flash_erase", "-j", options, device, "0", "0"],
        "ext2" | "ext3" | "ext4" => {
            return cmdline_mkfs(fs_type, &["-F"], options, device);
        }
        "ubifs" => return cmdline_mkfs(fs_type, &["-y"], options, device),
        "xfs" => return cmdline_mkfs(fs_type, &["-f"], options, device),
        "btrfs" | "vfat" | "f2fs" => return cmdline_mkfs(fs_type, &[], options, device),
        _ => return None,
    };
    Some(join_non_empty(&parts))
}

fn cmdline_mkfs(
    fs_type: &str,
    flags: &[&str],
    options: &str,
    device: &str,
) -> Option<String> {
    let tool = format!("mkfs.{fs_type}");
    let mut parts = vec![tool.as_str()];
    parts.extend_from_slice(flags);
    parts.push(options);
    parts.push(device);
    Some(join_non_empty(&parts))
}

fn join_non_empty(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct FilesystemManager {
    runner: Box<dyn CommandRunner>,
    search_path: Option<OsString>,
}

impl FilesystemManager {
    pub fn new(runner: Box<dyn CommandRunner>) -> Self {
        Self {
            runner,
            search_path: None,
        }
    }

    /// Overrides the search path used to resolve format tools. Intended for
    /// tests and chroot environments; the default is the process `PATH`.
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    fn resolve_binary(&self, binary: &str) -> Option<PathBuf> {
        let search_path = self
            .search_path
            .clone()
            .or_else(|| env::var_os("PATH"))?;
        env::split_paths(&search_path)
            .map(|dir| dir.join(binary))
            .find(|candidate| candidate.is_file())
    }

    /// Creates `fs_type` on `device` by invoking the matching userland tool.
    ///
    /// Unsupported filesystem types and unresolvable tools are reported
    /// without attempting execution.
    pub fn format(&self, device: &str, fs_type: &str, options: &str) -> Result<(), Error> {
        let cmdline = cmdline_for_format(device, fs_type, options).ok_or_else(|| {
            Error::UnsupportedFsType {
                device: device.to_owned(),
                fs_type: fs_type.to_owned(),
            }
        })?;

        // cmdline_for_format never returns an empty string, so the unwrap
        // can't trigger.
        let binary = cmdline.split_whitespace().next().unwrap().to_owned();
        if self.resolve_binary(&binary).is_none() {
            return Err(Error::BinaryNotFound {
                device: device.to_owned(),
                binary,
            });
        }

        debug!("formatting with `{cmdline}`");
        self.runner
            .execute(&cmdline)
            .map_err(|source| Error::Format {
                device: device.to_owned(),
                source,
            })
    }

    /// Mounts `device` at `mount_path` inside a private mount namespace.
    ///
    /// Entering the namespace or marking the rootfs as a recursive slave
    /// mount must not fail; if either does, isolation cannot be guaranteed
    /// and the process halts rather than risk polluting the host mount table.
    pub fn mount(
        &self,
        device: &str,
        mount_path: &Path,
        fs_type: &str,
        options: &str,
    ) -> Result<(), Error> {
        if let Err(e) = unshare(CloneFlags::CLONE_NEWNS) {
            error!("failed to enter private mount namespace: {e}");
            std::process::exit(1);
        }

        if let Err(e) = mount(
            None::<&str>,
            "/",
            None::<&str>,
            MsFlags::MS_REC | MsFlags::MS_SLAVE,
            None::<&str>,
        ) {
            error!("failed to mark rootfs as rslave: {e}");
            std::process::exit(1);
        }

        let data = if options.is_empty() {
            None
        } else {
            Some(options)
        };
        debug!(
            "mounting `{device}` ({fs_type}) at `{}`",
            mount_path.display()
        );
        mount(
            Some(device),
            mount_path,
            Some(fs_type),
            MsFlags::empty(),
            data,
        )
        .map_err(|source| Error::Mount {
            device: device.to_owned(),
            source,
        })
    }

    /// Unmounts `mount_path`. Unmounting a path that is not mounted is an
    /// error, not a silent no-op.
    pub fn umount(&self, mount_path: &Path) -> Result<(), Error> {
        umount(mount_path).map_err(|source| Error::Umount {
            path: mount_path.to_path_buf(),
            source,
        })
    }

    /// Creates an ephemeral staging directory under [`SCRATCH_BASE`].
    pub fn temp_dir(&self, prefix: &str) -> Result<PathBuf, Error> {
        std::fs::create_dir_all(SCRATCH_BASE).map_err(Error::TempDir)?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(SCRATCH_BASE)
            .map_err(Error::TempDir)?;
        Ok(dir.into_path())
    }
}
