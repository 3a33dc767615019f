//! Install modes and their registry.
//!
//! An install mode is a named strategy for applying one object to the device.
//! The `Installing` state resolves a mode by the name found in the object's
//! metadata and only ever uses the two-operation contract: a requirement
//! check and an object factory.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use ota_update_agent_core::ObjectMetadata;

use crate::filesystem::FilesystemManager;

pub mod copy;
pub mod raw;

/// Metadata problems an install mode can surface from its object factory.
/// These are never retryable; the metadata will not get less corrupt by
/// waiting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("install mode `{mode}` requires metadata field `{field}`")]
    MissingField {
        mode: &'static str,
        field: &'static str,
    },
}

/// One object, resolved and ready to be applied to the device.
pub trait InstallableObject {
    /// Applies the object. `source` is the verified payload on disk.
    fn install(&self, source: &Path, fs: &FilesystemManager) -> eyre::Result<()>;
}

/// The capability bundle registered under a mode name.
#[derive(Clone)]
pub struct InstallMode {
    pub name: &'static str,
    /// Checks that this device can run the mode at all. Failure is fatal:
    /// waiting will not grow the environment new capabilities.
    pub check_requirements: fn() -> eyre::Result<()>,
    /// Builds the installable object for one metadata entry.
    pub get_object: fn(&ObjectMetadata) -> eyre::Result<Box<dyn InstallableObject>>,
}

/// Registry mapping mode names to install modes.
///
/// Registration is scoped: dropping the returned [`RegisteredMode`] removes
/// the mode again, which keeps tests isolated from each other.
#[derive(Clone, Default)]
pub struct InstallModeRegistry {
    modes: Arc<Mutex<HashMap<&'static str, InstallMode>>>,
}

impl InstallModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every mode this agent ships. The returned
    /// guards must stay alive for as long as the registry is in use.
    pub fn with_builtin_modes() -> (Self, Vec<RegisteredMode>) {
        let registry = Self::new();
        let guards = vec![
            registry.register(copy::mode()),
            registry.register(raw::mode()),
        ];
        (registry, guards)
    }

    pub fn register(&self, mode: InstallMode) -> RegisteredMode {
        let name = mode.name;
        self.modes
            .lock()
            .expect("install mode registry lock poisoned")
            .insert(name, mode);
        RegisteredMode {
            registry: self.clone(),
            name,
        }
    }

    pub fn resolve(&self, name: &str) -> Option<InstallMode> {
        self.modes
            .lock()
            .expect("install mode registry lock poisoned")
            .get(name)
            .cloned()
    }
}

/// Guard returned by [`InstallModeRegistry::register`]; unregisters the mode
/// on drop.
pub struct RegisteredMode {
    registry: InstallModeRegistry,
    name: &'static str,
}

impl RegisteredMode {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for RegisteredMode {
    fn drop(&mut self) {
        self.registry
            .modes
            .lock()
            .expect("install mode registry lock poisoned")
            .remove(self.name);
    }
}


#[cfg(test)]
mod tests {
    use super::{test_support::noop_mode, *};

    #[test]
    fn modes_resolve_while_registered() {
        let registry = InstallModeRegistry::new();
        let guard = registry.register(noop_mode("test"));
        assert_eq!(guard.name(), "test");
        assert!(registry.resolve("test").is_some());
        assert!(registry.resolve("other").is_none());
    }

    #[test]
    fn dropping_the_guard_unregisters_the_mode() {
        let registry = InstallModeRegistry::new();
        {
            let _guard = registry.register(noop_mode("scoped"));
            assert!(registry.resolve("scoped").is_some());
        }
        assert!(registry.resolve("scoped").is_none());
    }

    #[test]
    fn builtin_modes_cover_copy_and_raw() {
        let (registry, guards) = InstallModeRegistry::with_builtin_modes();
        assert!(registry.resolve("copy").is_some());
        assert!(registry.resolve("raw").is_some());
        drop(guards);
        assert!(registry.resolve("copy").is_none());
    }
}
