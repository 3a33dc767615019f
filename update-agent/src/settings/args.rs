use clap::Parser;
use serde::Serialize;

/// An on-device agent that polls an update server, downloads and installs
/// update packages, and reboots into the new image.
///
/// This tool is designed to do exactly as instructed, with no training
/// wheels. It formats and writes to the devices the update metadata names and
/// should be treated with the same care as `dd` onto a mounted disk.
#[derive(Debug, Parser, Serialize)]
#[command(author, version)]
pub struct Args {
    /// The path to the config file.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    /// Address of the update server.
    #[arg(long, alias = "server")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_address: Option<String>,
    /// Product UID this device reports to the server.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_uid: Option<String>,
    /// The ID of the device.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Hardware identifier of the device.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware: Option<String>,
    /// Installation set to install on this device (0 or 1).
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation_set: Option<usize>,
    /// Seconds between update probes.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<u64>,
    /// Duration in milliseconds that the agent will wait between downloading
    /// objects of an update package.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_delay: Option<u64>,
    /// The download destination.
    #[arg(long, alias = "dir")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<String>,
    /// Path of the persisted runtime state file.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_state: Option<String>,
    /// Prevents the agent from using dbus; reboots fall back to invoking
    /// systemctl directly.
    #[arg(long)]
    // Serialization is skipped if not set because command line args always take
    // precedence over env vars and a config file. This would otherwise make it
    // impossible to set this config option outside of cli args.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub nodbus: bool,
    /// Downloads and verifies all objects, but does not execute the actual
    /// install step.
    #[arg(long)]
    // Serialization is skipped if not set because command line args always take
    // precedence over env vars and a config file. This would otherwise make it
    // impossible to set this config option outside of cli args.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub noupdate: bool,
}
