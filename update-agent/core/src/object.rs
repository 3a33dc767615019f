//! Per-object install descriptions as listed in the update metadata.
//!
//! Every object names its install mode; all remaining fields are consumed by
//! the install mode that gets resolved for it. Fields that only make sense
//! for one mode are optional and default to `None`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Whether `target` names a block device directly or something that still
/// needs to be resolved to one.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    #[default]
    Device,
    Mtdname,
    Ubivolume,
}

/// A single installable object inside an installation set.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ObjectMetadata {
    /// Name of the install mode that applies this object.
    pub mode: String,
    pub filename: String,
    pub sha256sum: String,
    #[serde(default)]
    pub size: u64,
    /// Device (or mtd/ubi name) the object is written to.
    pub target: String,
    #[serde(rename = "target-type", default)]
    pub target_type: TargetType,

    // copy-mode fields
    pub filesystem: Option<String>,
    #[serde(rename = "target-path")]
    pub target_path: Option<PathBuf>,
    #[serde(default)]
    pub format: bool,
    #[serde(rename = "format-options", default)]
    pub format_options: String,
    #[serde(rename = "mount-options", default)]
    pub mount_options: String,

    // raw-mode fields
    #[serde(rename = "chunk-size")]
    pub chunk_size: Option<u64>,
    #[serde(default)]
    pub seek: u64,
    #[serde(default)]
    pub skip: u64,
}

impl ObjectMetadata {
    /// Whether installing this object makes the running image stale, i.e. the
    /// device must reboot into the new image once the whole set is installed.
    pub fn requires_reboot(&self) -> bool {
        // Anything written straight to a device or partition replaces what
        // the system may currently be running from.
        self.target_type == TargetType::Device && self.target_path.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COPY_OBJECT: &str = r#"{
        "mode": "copy",
        "filename": "boot.img",
        "sha256sum": "9af3f6a5e5f2ec98f1a0210b832467ee2729a5624547b213059de2e7720d4a4a",
        "size": 1024,
        "target": "/dev/mmcblk0p2",
        "target-type": "device",
        "filesystem": "ext4",
        "target-path": "/boot.img",
        "format": true,
        "format-options": "-q"
    }"#;

    #[test]
    fn copy_object_parses_with_defaults() {
        let object: ObjectMetadata = serde_json::from_str(COPY_OBJECT).unwrap();
        assert_eq!(object.mode, "copy");
        assert_eq!(object.filesystem.as_deref(), Some("ext4"));
        assert_eq!(object.format_options, "-q");
        assert_eq!(object.mount_options, "");
        assert_eq!(object.seek, 0);
        assert_eq!(object.chunk_size, None);
    }

    #[test]
    fn copy_to_a_mounted_path_does_not_require_reboot() {
        let object: ObjectMetadata = serde_json::from_str(COPY_OBJECT).unwrap();
        assert!(!object.requires_reboot());
    }

    #[test]
    fn raw_device_write_requires_reboot() {
        let object: ObjectMetadata = serde_json::from_str(
            r#"{
                "mode": "raw",
                "filename": "rootfs.img",
                "sha256sum": "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
                "target": "/dev/mmcblk0p3"
            }"#,
        )
        .unwrap();
        assert!(object.requires_reboot());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        serde_json::from_str::<ObjectMetadata>(
            r#"{
                "mode": "raw",
                "filename": "a",
                "sha256sum": "00",
                "target": "/dev/null",
                "compression": "zstd"
            }"#,
        )
        .unwrap_err();
    }
}
