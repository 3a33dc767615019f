//! The parsed update metadata document.
//!
//! The server hands the agent a JSON document describing one update package.
//! It is parsed exactly once, validated, and never mutated afterwards; the
//! states of the agent pass it around by reference (or clone it into the next
//! state) while an update is in flight.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{ObjectMetadata, SupportedHardware};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed deserializing update metadata")]
    Deserialize(#[source] serde_path_to_error::Error<serde_json::Error>),
    #[error("update metadata contains no installation sets")]
    NoInstallationSets,
    #[error("update metadata contains {0} installation sets, at most 2 are allowed")]
    TooManyInstallationSets(usize),
    #[error("installation set {0} contains no objects")]
    EmptyInstallationSet(usize),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct UpdateMetadata {
    #[serde(rename = "product-uid")]
    pub product_uid: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "supported-hardware", default)]
    pub supported_hardware: SupportedHardware,
    /// Installation sets. Devices with redundant (A/B) layouts carry two
    /// sets; the agent installs exactly one of them.
    pub objects: Vec<Vec<ObjectMetadata>>,
    /// sha256 over the raw document, set during [`UpdateMetadata::from_json`].
    #[serde(skip)]
    package_uid: String,
}

impl UpdateMetadata {
    /// Parses and validates a raw metadata document received from the server.
    ///
    /// This is the only constructor; the `package_uid` identifying the
    /// package towards the server is the hex sha256 of the raw bytes, so it
    /// can only be derived here.
    pub fn from_json(content: &[u8]) -> Result<Self, Error> {
        let deserializer = &mut serde_json::Deserializer::from_slice(content);
        let mut metadata: UpdateMetadata =
            serde_path_to_error::deserialize(deserializer).map_err(Error::Deserialize)?;
        metadata.package_uid = hex::encode(Sha256::digest(content));
        metadata.validate()?;
        Ok(metadata)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.objects.is_empty() {
            return Err(Error::NoInstallationSets);
        }
        if self.objects.len() > 2 {
            return Err(Error::TooManyInstallationSets(self.objects.len()));
        }
        if let Some(set) = self.objects.iter().position(|set| set.is_empty()) {
            return Err(Error::EmptyInstallationSet(set));
        }
        Ok(())
    }

    pub fn package_uid(&self) -> &str {
        &self.package_uid
    }

    /// The objects to install on this pass. `set` is clamped to the last
    /// available installation set so single-set packages work on redundant
    /// devices.
    pub fn installation_set(&self, set: usize) -> &[ObjectMetadata] {
        let set = set.min(self.objects.len() - 1);
        &self.objects[set]
    }

    /// Total download size of one installation set.
    pub fn installation_set_size(&self, set: usize) -> u64 {
        self.installation_set(set).iter().map(|o| o.size).sum()
    }

    pub fn requires_reboot(&self, set: usize) -> bool {
        self.installation_set(set)
            .iter()
            .any(ObjectMetadata::requires_reboot)
    }
}
