use ota_update_agent_core::UpdateMetadata;
use tracing::info;

use crate::{
    client::ApiClient,
    errors::UpdateError,
    machine::Context,
    states::{ErrorState, Idle, State},
};

/// Rebooting into the freshly installed image.
///
/// Reaching this state means the reboot is due unconditionally; its outcome
/// alone decides the next state. Metadata is optional because a reboot can be
/// requested without an update pending.
#[derive(Debug, PartialEq)]
pub struct Rebooting {
    api_client: ApiClient,
    update_metadata: Option<UpdateMetadata>,
}

impl Rebooting {
    pub fn new(api_client: ApiClient, update_metadata: Option<UpdateMetadata>) -> Self {
        Self {
            api_client,
            update_metadata,
        }
    }

    pub fn update_metadata(&self) -> Option<&UpdateMetadata> {
        self.update_metadata.as_ref()
    }

    pub(super) fn handle(self, ctx: &mut Context) -> (State, bool) {
        info!("triggering reboot");
        match ctx.rebooter.reboot() {
            Ok(()) => (Idle::new(self.api_client).into(), false),
            Err(e) => {
                let error_state = ErrorState::new(
                    self.api_client,
                    self.update_metadata,
                    UpdateError::transient(e),
                );
                (error_state.into(), false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use eyre::eyre;

    use super::*;
    use crate::{
        machine::test_support::{test_context, test_metadata},
        rebooter::MockRebooter,
        states::StateId,
    };

    #[test]
    fn id_is_rebooting_regardless_of_construction() {
        let with_metadata = State::from(Rebooting::new(
            ApiClient::new("address"),
            Some(test_metadata()),
        ));
        let without_metadata =
            State::from(Rebooting::new(ApiClient::new("address"), None));
        assert_eq!(with_metadata.id(), StateId::Rebooting);
        assert_eq!(without_metadata.id(), StateId::Rebooting);
    }

    #[test]
    fn update_metadata_returns_exactly_what_was_passed_in() {
        let metadata = test_metadata();
        let state = Rebooting::new(ApiClient::new("address"), Some(metadata.clone()));
        assert_eq!(state.update_metadata(), Some(&metadata));

        let state = Rebooting::new(ApiClient::new("address"), None);
        assert_eq!(state.update_metadata(), None);
    }

    #[test]
    fn successful_reboot_invokes_the_capability_exactly_once() {
        let (mut ctx, _dir) = test_context();
        let mut rebooter = MockRebooter::new();
        rebooter.expect_reboot().times(1).returning(|| Ok(()));
        ctx.rebooter = Box::new(rebooter);

        let state = Rebooting::new(ApiClient::new("address"), Some(test_metadata()));
        let (next, cancelled) = state.handle(&mut ctx);

        assert_eq!(next.id(), StateId::Idle);
        assert!(!cancelled);
    }

    #[test]
    fn failed_reboot_becomes_a_transient_error_state() {
        let (mut ctx, _dir) = test_context();
        let mut rebooter = MockRebooter::new();
        rebooter
            .expect_reboot()
            .times(1)
            .returning(|| Err(eyre!("reboot error")));
        ctx.rebooter = Box::new(rebooter);

        let api_client = ApiClient::new("address");
        let state = Rebooting::new(api_client.clone(), None);
        let (next, cancelled) = state.handle(&mut ctx);

        let expected = State::from(ErrorState::new(
            api_client,
            None,
            UpdateError::transient(eyre!("reboot error")),
        ));
        assert_eq!(next, expected);
        assert!(!cancelled);
    }
}
