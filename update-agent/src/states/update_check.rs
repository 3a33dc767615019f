use eyre::eyre;
use tracing::info;

use crate::{
    client::{ApiClient, ProbeResponse},
    errors::UpdateError,
    machine::Context,
    states::{Downloading, ErrorState, Idle, State},
};

/// Asking the server whether an update is available.
#[derive(Debug, PartialEq)]
pub struct UpdateCheck {
    api_client: ApiClient,
}

impl UpdateCheck {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }

    pub(super) fn handle(self, ctx: &mut Context) -> (State, bool) {
        match self.api_client.probe(&ctx.device_identity()) {
            Ok(response) => self.route(response, ctx),
            Err(e) => {
                let error_state =
                    ErrorState::new(self.api_client, None, UpdateError::transient(e));
                (error_state.into(), false)
            }
        }
    }

    /// Decides the next state for a successful probe. Any successful probe
    /// resets the transient failure counter; only an update this device can
    /// use and has not installed yet proceeds to downloading.
    fn route(self, response: ProbeResponse, ctx: &mut Context) -> (State, bool) {
        let metadata = match response {
            ProbeResponse::NoUpdate { extra_poll } => {
                info!("no update available");
                ctx.runtime.reset_transient_failures();
                ctx.runtime.set_extra_poll(extra_poll);
                return (Idle::new(self.api_client).into(), ctx.cancelled());
            }
            ProbeResponse::Update(metadata) => metadata,
        };

        if !metadata
            .supported_hardware
            .supports(&ctx.settings.hardware)
        {
            let error = UpdateError::fatal(eyre!(
                "update package `{}` does not support hardware `{}`",
                metadata.package_uid(),
                ctx.settings.hardware,
            ));
            return (ErrorState::new(self.api_client, None, error).into(), false);
        }

        if ctx.runtime.installed_package() == Some(metadata.package_uid()) {
            info!(
                "package `{}` is already installed; waiting for it to become active",
                metadata.package_uid(),
            );
            ctx.runtime.reset_transient_failures();
            return (Idle::new(self.api_client).into(), ctx.cancelled());
        }

        ctx.runtime.reset_transient_failures();
        (
            Downloading::new(self.api_client, metadata).into(),
            ctx.cancelled(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ota_update_agent_core::UpdateMetadata;

    use super::*;
    use crate::{
        errors::Severity,
        machine::test_support::{test_context, test_metadata},
        states::StateId,
    };

    fn check() -> UpdateCheck {
        UpdateCheck::new(ApiClient::new("address"))
    }

    #[test]
    fn no_update_resets_failures_and_keeps_the_extra_poll() {
        let (mut ctx, _dir) = test_context();
        ctx.runtime.record_transient_failure();

        let (next, _) = check().route(
            ProbeResponse::NoUpdate {
                extra_poll: Some(Duration::from_secs(5)),
            },
            &mut ctx,
        );

        assert_eq!(next.id(), StateId::Idle);
        assert_eq!(ctx.runtime.transient_failures(), 0);
        assert_eq!(ctx.runtime.take_extra_poll(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn usable_update_proceeds_to_downloading() {
        let (mut ctx, _dir) = test_context();

        let (next, cancelled) =
            check().route(ProbeResponse::Update(test_metadata()), &mut ctx);

        assert_eq!(next.id(), StateId::Downloading);
        assert!(!cancelled);
    }

    #[test]
    fn unsupported_hardware_is_fatal() {
        let (mut ctx, _dir) = test_context();
        let metadata = UpdateMetadata::from_json(
            br#"{
                "product-uid": "0123456789",
                "supported-hardware": ["hardware2-revA"],
                "objects": [[
                    {
                        "mode": "raw",
                        "filename": "rootfs.img",
                        "sha256sum": "00",
                        "target": "/dev/mmcblk0p2"
                    }
                ]]
            }"#,
        )
        .unwrap();

        let (next, _) = check().route(ProbeResponse::Update(metadata), &mut ctx);

        let State::Error(error_state) = next else {
            panic!("expected an error state, got {:?}", next.id());
        };
        assert_eq!(error_state.error().severity(), Severity::Fatal);
    }

    #[test]
    fn already_installed_package_waits_and_resets_failures() {
        let (mut ctx, _dir) = test_context();
        let metadata = test_metadata();
        ctx.runtime
            .record_installed_package(metadata.package_uid())
            .unwrap();
        ctx.runtime.record_transient_failure();
        ctx.runtime.record_transient_failure();

        let (next, _) = check().route(ProbeResponse::Update(metadata), &mut ctx);

        // Successful probes while waiting for the reboot must not keep the
        // device paying a backoff penalty.
        assert_eq!(next.id(), StateId::Idle);
        assert_eq!(ctx.runtime.transient_failures(), 0);
    }
}
