use std::fs;

use ota_update_agent_core::UpdateMetadata;
use tracing::{info, warn};

use crate::{
    client::ApiClient,
    errors::UpdateError,
    machine::Context,
    states::{ErrorState, Idle, Installing, State},
    util,
};

/// Fetching the objects of an update package.
///
/// Objects already on disk with a matching hash are not fetched again; this
/// is what makes resuming after a transient failure cheap.
#[derive(Debug, PartialEq)]
pub struct Downloading {
    api_client: ApiClient,
    update_metadata: UpdateMetadata,
}

impl Downloading {
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
            // Honor cancellation between objects; nothing written so far is
            // wasted, the hashes on disk short-circuit the next attempt.
            if ctx.cancelled() {
                info!("cancellation observed; abandoning download");
                return (Idle::new(self.api_client).into(), true);
            }

            let on_disk = ctx.settings.downloads.join(&object.sha256sum);
            if on_disk.is_file() && util::check_hash(&on_disk, &object.sha256sum).is_ok()
            {
                info!("object `{}` already fetched and verified", object.filename);
                continue;
            }

            info!("fetching object `{}`", object.filename);
            let downloaded = self.api_client.download_object(
                &self.update_metadata.product_uid,
                self.update_metadata.package_uid(),
                &object.sha256sum,
                &ctx.settings.downloads,
            );
            let path = match downloaded {
                Ok(path) => path,
                Err(e) => {
                    let error_state = ErrorState::new(
                        self.api_client,
                        Some(self.update_metadata),
                        UpdateError::transient(e),
                    );
                    return (error_state.into(), false);
                }
            };

            if let Err(e) = util::check_hash(&path, &object.sha256sum) {
                warn!("discarding object with mismatching hash: {e:?}");
                let _ = fs::remove_file(&path);
                let error_state = ErrorState::new(
                    self.api_client,
                    Some(self.update_metadata),
                    UpdateError::transient(e),
                );
                return (error_state.into(), false);
            }

            if !ctx.settings.download_delay.is_zero()
                && ctx.sleep_observing_cancel(ctx.settings.download_delay)
            {
                info!("cancellation observed; abandoning download");
                return (Idle::new(self.api_client).into(), true);
            }
        }

        if ctx.settings.noupdate {
            info!("noupdate was requested; not proceeding to install");
            return (Idle::new(self.api_client).into(), false);
        }

        (
            Installing::new(self.api_client, self.update_metadata).into(),
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::Severity,
        machine::test_support::{test_context, test_metadata},
        states::StateId,
    };

    // An address nothing listens on, so any attempted fetch fails fast
    // instead of hanging the test on a real connection.
    const DEAD_SERVER: &str = "https://localhost:1";

    /// Stages `content` under the name `Downloading` expects for the first
    /// object of the fixture metadata.
    fn stage_object(ctx: &crate::machine::Context, content: &[u8]) {
        let metadata = test_metadata();
        let object = &metadata.installation_set(0)[0];
        std::fs::create_dir_all(&ctx.settings.downloads).unwrap();
        std::fs::write(ctx.settings.downloads.join(&object.sha256sum), content)
            .unwrap();
    }

    #[test]
    fn verified_objects_on_disk_are_not_fetched_again() {
        let (mut ctx, _dir) = test_context();
        // the fixture object's sha256sum is the hash of empty input
        stage_object(&ctx, b"");

        let state = Downloading::new(ApiClient::new(DEAD_SERVER), test_metadata());
        let (next, cancelled) = state.handle(&mut ctx);

        // Reaching Installing proves the dead server was never contacted.
        assert_eq!(next.id(), StateId::Installing);
        assert!(!cancelled);
    }

    #[test]
    fn corrupted_on_disk_object_is_fetched_again() {
        let (mut ctx, _dir) = test_context();
        stage_object(&ctx, b"garbage that does not hash to the recorded sum");

        let state = Downloading::new(ApiClient::new(DEAD_SERVER), test_metadata());
        let (next, cancelled) = state.handle(&mut ctx);

        // The re-fetch hits the dead server, which is a transient failure.
        assert!(!cancelled);
        let State::Error(error_state) = next else {
            panic!("expected an error state, got {:?}", next.id());
        };
        assert_eq!(error_state.error().severity(), Severity::Transient);
        assert_eq!(error_state.update_metadata(), Some(&test_metadata()));
    }

    #[test]
    fn failed_fetch_is_a_transient_error() {
        let (mut ctx, _dir) = test_context();

        let state = Downloading::new(ApiClient::new(DEAD_SERVER), test_metadata());
        let (next, cancelled) = state.handle(&mut ctx);

        assert!(!cancelled);
        let State::Error(error_state) = next else {
            panic!("expected an error state, got {:?}", next.id());
        };
        assert_eq!(error_state.error().severity(), Severity::Transient);
    }

    #[test]
    fn noupdate_stops_short_of_installing() {
        let (mut ctx, _dir) = test_context();
        ctx.settings.noupdate = true;
        stage_object(&ctx, b"");

        let state = Downloading::new(ApiClient::new(DEAD_SERVER), test_metadata());
        let (next, cancelled) = state.handle(&mut ctx);

        assert_eq!(next.id(), StateId::Idle);
        assert!(!cancelled);
    }

    #[test]
    fn cancellation_is_observed_between_objects() {
        let (mut ctx, _dir) = test_context();
        ctx.cancel_handle().cancel();

        let state = Downloading::new(ApiClient::new(DEAD_SERVER), test_metadata());
        let (next, cancelled) = state.handle(&mut ctx);

        assert_eq!(next.id(), StateId::Idle);
        assert!(cancelled);
    }
}
