//! The single-operation reboot capability.
//!
//! The state machine never issues reboot syscalls or commands itself; it only
//! ever sees this trait so tests can substitute a double.

use eyre::{bail, ensure, WrapErr as _};
use tracing::{debug, error};

use crate::dbus::proxies::LogindProxyBlocking;

#[cfg_attr(test, mockall::automock)]
pub trait Rebooter {
    /// Restarts the device, or signals the restart. Synchronous; returning
    /// `Ok` means the reboot was accepted, not that it already happened.
    fn reboot(&self) -> eyre::Result<()>;
}

/// Reboots through logind, falling back to `systemctl`.
pub struct SystemRebooter {
    use_dbus: bool,
}

impl SystemRebooter {
    pub fn new(use_dbus: bool) -> Self {
        Self { use_dbus }
    }

    fn reboot_with_dbus(&self) -> eyre::Result<()> {
        zbus::blocking::Connection::system()
            .wrap_err("failed establishing a system dbus connection")
            .and_then(|conn| {
                LogindProxyBlocking::new(&conn)
                    .wrap_err("failed creating login1 Manager proxy")
            })
            .and_then(|proxy| {
                debug!(
                    "scheduling reboot in 0ms by calling \
                     org.freedesktop.login1.Manager.ScheduleShutdown"
                );
                proxy.schedule_shutdown("reboot", 0).wrap_err(
                    "failed issuing scheduled reboot to \
                     org.freedesktop.login1.Manager.ScheduleShutdown",
                )
            })
    }

    fn reboot_with_executable(&self) -> eyre::Result<()> {
        let output = std::process::Command::new("/bin/systemctl")
            .arg("reboot")
            .output()
            .wrap_err("failed spawning `/bin/systemctl reboot`")?;
        ensure!(
            output.status.success(),
            "command `/bin/systemctl reboot` failed with status code `{:?}` and stderr `{:?}`",
            output.status,
            String::from_utf8_lossy(&output.stderr),
        );
        Ok(())
    }
}

impl Rebooter for SystemRebooter {
    fn reboot(&self) -> eyre::Result<()> {
        if self.use_dbus {
            debug!("trying to reboot using dbus");
            match self.reboot_with_dbus() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    error!("error: {e:?}, failed rebooting with logind dbus call")
                }
            }
        }
        debug!("trying to reboot using executable");
        match self.reboot_with_executable() {
            Ok(()) => return Ok(()),
            Err(e) => error!("error: {e:?}, failed rebooting with executable"),
        }
        bail!("rebooting the device failed; see logs for information");
    }
}
