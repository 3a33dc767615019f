#![forbid(unsafe_code)]
#![warn(unreachable_pub)]

pub mod metadata;
pub mod object;
mod supported_hardware;

pub use metadata::UpdateMetadata;
pub use object::ObjectMetadata;
pub use supported_hardware::SupportedHardware;
