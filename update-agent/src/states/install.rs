use eyre::WrapErr as _;
use ota_update_agent_core::UpdateMetadata;
use tracing::info;

use crate::{
    client::ApiClient,
    errors::UpdateError,
    filesystem, installer,
    machine::Context,
    states::{ErrorState, Idle, Rebooting, State},
};

/// Classifies an install failure. Conditions the environment can never grow
/// out of (unsupported filesystem, missing tooling, unusable metadata) are
/// fatal; everything else is worth retrying.
fn classify(report: eyre::Report) -> UpdateError {
    if let Some(fs_error) = report.downcast_ref::<filesystem::Error>() {
        if !fs_error.is_retryable() {
            return UpdateError::fatal(report);
        }
        return UpdateError::transient(report);
    }
    if report.downcast_ref::<installer::Error>().is_some() {
        return UpdateError::fatal(report);
    }
    UpdateError::transient(report)
}

/// Applying the objects of a fetched update package, one install mode at a
/// time. Cancellation is deliberately not observed here; a partially written
/// object must run to completion or fail on its own.
#[derive(Debug, PartialEq)]
pub struct Installing {
    api_client: ApiClient,
    update_metadata: UpdateMetadata,
}

impl Installing {
    pub fn new(api_client: ApiClient, update_metadata: UpdateMetadata) -> Self {
        Self {
            api_client,
            update_metadata,
        }
    }

    pub fn update_metadata(&self) -> &UpdateMetadata {
        &self.update_metadata
    }

    pub(super) fn handle(self, ctx: &mut Context) -> (State, bool) {
        let set = ctx.settings.installation_set;
        let objects = self.update_metadata.installation_set(set).to_vec();
        for object in &objects {
            let Some(mode) = ctx.registry.resolve(&object.mode) else {
                let error = UpdateError::fatal(eyre::eyre!(
                    "install mode `{}` is not registered",
                    object.mode,
                ));
                let error_state =
                    ErrorState::new(self.api_client, Some(self.update_metadata), error);
                return (error_state.into(), false);
            };

            if let Err(e) = (mode.check_requirements)() {
                let error = UpdateError::fatal(e.wrap_err(format!(
                    "this device cannot run install mode `{}`",
                    object.mode,
                )));
                let error_state =
                    ErrorState::new(self.api_client, Some(self.update_metadata), error);
                return (error_state.into(), false);
            }

            let installable = match (mode.get_object)(object) {
                Ok(installable) => installable,
                Err(e) => {
                    let error_state = ErrorState::new(
                        self.api_client,
                        Some(self.update_metadata),
                        classify(e),
                    );
                    return (error_state.into(), false);
                }
            };

            info!(
                "installing object `{}` with mode `{}`",
                object.filename, object.mode,
            );
            let source = ctx.settings.downloads.join(&object.sha256sum);
            if let Err(e) = installable.install(&source, &ctx.filesystem) {
                let error_state = ErrorState::new(
                    self.api_client,
                    Some(self.update_metadata),
                    classify(e),
                );
                return (error_state.into(), false);
            }
        }

        (
            Install::new(self.api_client, self.update_metadata).into(),
            false,
        )
    }
}

/// Finalizing a fully applied package: persist the bookkeeping and decide
/// whether the device must reboot into the new image.
#[derive(Debug, PartialEq)]
pub struct Install {
    api_client: ApiClient,
    update_metadata: UpdateMetadata,
}

impl Install {
    pub fn new(api_client: ApiClient, update_metadata: UpdateMetadata) -> Self {
        Self {
            api_client,
            update_metadata,
        }
    }

    pub fn update_metadata(&self) -> &UpdateMetadata {
        &self.update_metadata
    }

    pub(super) fn handle(self, ctx: &mut Context) -> (State, bool) {
        if let Err(e) = ctx
            .runtime
            .record_installed_package(self.update_metadata.package_uid())
        {
            // Without this record the agent would reinstall the package on
            // every probe; stopping is the safer failure.
            let error =
                UpdateError::fatal(e.wrap_err("failed recording installed package"));
            let error_state =
                ErrorState::new(self.api_client, Some(self.update_metadata), error);
            return (error_state.into(), false);
        }

        if self
            .update_metadata
            .requires_reboot(ctx.settings.installation_set)
        {
            info!("update installed; rebooting into the new image");
            return (
                Rebooting::new(self.api_client, Some(self.update_metadata)).into(),
                false,
            );
        }

        info!("update installed; no reboot required");
        (Idle::new(self.api_client).into(), false)
    }
}

#[cfg(test)]
mod tests {
    use eyre::eyre;

    use super::*;
    use crate::{
        errors::Severity,
        installer::test_support::noop_mode,
        machine::test_support::{test_context, test_metadata},
        states::StateId,
    };

    #[test]
    fn classification_follows_the_underlying_error() {
        let unsupported: eyre::Report = filesystem::Error::UnsupportedFsType {
            device: "/dev/mtd0".into(),
            fs_type: "squashfs".into(),
        }
        .into();
        assert_eq!(classify(unsupported).severity(), Severity::Fatal);

        let io: eyre::Report = filesystem::Error::Format {
            device: "/dev/mtd0".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        }
        .into();
        assert_eq!(classify(io).severity(), Severity::Transient);

        let metadata: eyre::Report = installer::Error::MissingField {
            mode: "copy",
            field: "filesystem",
        }
        .into();
        assert_eq!(classify(metadata).severity(), Severity::Fatal);

        assert_eq!(
            classify(eyre!("some I/O problem")).severity(),
            Severity::Transient,
        );
    }

    #[test]
    fn unresolved_install_mode_is_fatal() {
        let (mut ctx, _dir) = test_context();
        let client = ApiClient::new("address");
        let metadata = test_metadata();

        let (next, cancelled) =
            Installing::new(client, metadata).handle(&mut ctx);

        assert!(!cancelled);
        let State::Error(error_state) = next else {
            panic!("expected an error state, got {:?}", next.id());
        };
        assert_eq!(error_state.error().severity(), Severity::Fatal);
    }

    #[test]
    fn failed_requirement_check_is_fatal() {
        let (mut ctx, _dir) = test_context();
        let mut mode = noop_mode("raw");
        mode.check_requirements = || Err(eyre!("requirements not met"));
        let _guard = ctx.registry.register(mode);

        let (next, _) =
            Installing::new(ApiClient::new("address"), test_metadata()).handle(&mut ctx);

        let State::Error(error_state) = next else {
            panic!("expected an error state, got {:?}", next.id());
        };
        assert_eq!(error_state.error().severity(), Severity::Fatal);
    }

    #[test]
    fn installed_objects_lead_to_finalization() {
        let (mut ctx, _dir) = test_context();
        let _guard = ctx.registry.register(noop_mode("raw"));

        let (next, cancelled) =
            Installing::new(ApiClient::new("address"), test_metadata()).handle(&mut ctx);

        assert!(!cancelled);
        assert_eq!(next.id(), StateId::Install);
    }

    #[test]
    fn finalize_records_the_package_and_requests_reboot() {
        let (mut ctx, _dir) = test_context();
        let metadata = test_metadata();
        let package_uid = metadata.package_uid().to_owned();

        let (next, cancelled) =
            Install::new(ApiClient::new("address"), metadata).handle(&mut ctx);

        assert!(!cancelled);
        // test metadata writes straight to a device, so a reboot is due
        assert_eq!(next.id(), StateId::Rebooting);
        assert_eq!(ctx.runtime.installed_package(), Some(package_uid.as_str()));
    }
}
