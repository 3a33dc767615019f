pub mod client;
pub mod dbus;
pub mod errors;
pub mod filesystem;
pub mod installer;
pub mod json;
pub mod logging;
pub mod machine;
pub mod rebooter;
pub mod runtime;
pub mod settings;
pub mod states;
pub mod util;

pub use client::ApiClient;
pub use errors::{Severity, UpdateError};
pub use filesystem::FilesystemManager;
pub use installer::InstallModeRegistry;
pub use machine::{CancelHandle, UpdateAgent};
pub use rebooter::{Rebooter, SystemRebooter};
pub use settings::{Args, Settings};
pub use states::{State, StateId};
