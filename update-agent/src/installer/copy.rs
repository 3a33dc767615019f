//! The `copy` install mode: place the payload as a file inside a target
//! filesystem, optionally formatting the target first.
//!
//! The target is mounted through [`FilesystemManager`], i.e. inside the
//! private mount namespace, so a crash mid-copy leaves no stray mounts
//! behind on the host.

use std::{fs, path::Path};

use eyre::WrapErr as _;
use nix::unistd::Uid;
use ota_update_agent_core::ObjectMetadata;
use tracing::{debug, info};

use super::{InstallMode, InstallableObject};
use crate::{filesystem::FilesystemManager, installer};

pub fn mode() -> InstallMode {
    InstallMode {
        name: "copy",
        check_requirements,
        get_object,
    }
}

fn check_requirements() -> eyre::Result<()> {
    eyre::ensure!(
        Uid::effective().is_root(),
        "the copy install mode performs privileged mounts and requires root",
    );
    Ok(())
}

fn get_object(
    metadata: &ObjectMetadata,
) -> eyre::Result<Box<dyn InstallableObject>> {
    let filesystem = metadata
        .filesystem
        .clone()
        .ok_or(installer::Error::MissingField {
            mode: "copy",
            field: "filesystem",
        })?;
    let target_path = metadata
        .target_path
        .clone()
        .ok_or(installer::Error::MissingField {
            mode: "copy",
            field: "target-path",
        })?;
    Ok(Box::new(CopyObject {
        target: metadata.target.clone(),
        filesystem,
        target_path,
        format: metadata.format,
        format_options: metadata.format_options.clone(),
        mount_options: metadata.mount_options.clone(),
    }))
}

struct CopyObject {
    target: String,
    filesystem: String,
    target_path: std::path::PathBuf,
    format: bool,
    format_options: String,
    mount_options: String,
}

impl CopyObject {
    fn copy_into(&self, mount_dir: &Path, source: &Path) -> eyre::Result<()> {
        // target-path is absolute within the mounted filesystem
        let relative = self
            .target_path
            .strip_prefix("/")
            .unwrap_or(&self.target_path);
        let dst = mount_dir.join(relative);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).wrap_err_with(|| {
                format!("failed creating `{}`", parent.display())
            })?;
        }
        debug!("copying `{}` to `{}`", source.display(), dst.display());
        fs::copy(source, &dst).wrap_err_with(|| {
            format!(
                "failed copying `{}` to `{}`",
                source.display(),
                dst.display(),
            )
        })?;
        fs::File::open(&dst)
            .and_then(|f| f.sync_all())
            .wrap_err_with(|| format!("failed syncing `{}`", dst.display()))?;
        Ok(())
    }
}

impl InstallableObject for CopyObject {
    fn install(&self, source: &Path, fs: &FilesystemManager) -> eyre::Result<()> {
        if self.format {
            info!("formatting `{}` as {}", self.target, self.filesystem);
            fs.format(&self.target, &self.filesystem, &self.format_options)?;
        }

        let mount_dir = fs.temp_dir("ota-mount-")?;
        fs.mount(
            &self.target,
            &mount_dir,
            &self.filesystem,
            &self.mount_options,
        )?;

        // Unmount even when the copy failed, then surface the first error.
        let copied = self.copy_into(&mount_dir, source);
        let unmounted = fs.umount(&mount_dir).map_err(eyre::Report::from);
        let _ = fs::remove_dir(&mount_dir);
        copied.and(unmounted)
    }
}
