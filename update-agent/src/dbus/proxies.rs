use zbus::proxy;

#[proxy(
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1",
    interface = "org.freedesktop.login1.Manager"
)]
pub trait Logind {
    /// Schedules a shutdown of the given kind (`"reboot"`, `"poweroff"`, ...)
    /// at `usec` microseconds after the epoch.
    #[zbus(name = "ScheduleShutdown")]
    fn schedule_shutdown(&self, kind: &str, usec: u64) -> zbus::Result<()>;
}
