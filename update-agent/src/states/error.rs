use ota_update_agent_core::UpdateMetadata;
use tracing::{error, warn};

use crate::{
    client::ApiClient,
    errors::{Severity, UpdateError},
    machine::Context,
    states::{Exit, Idle, State},
};

/// A classified failure, reported and routed according to its severity.
///
/// Carries the pending metadata (if any) purely as context; resumption after
/// a transient failure goes back through a fresh probe, with the verified
/// objects on disk making the retry cheap.
#[derive(Debug, PartialEq)]
pub struct ErrorState {
    api_client: ApiClient,
    update_metadata: Option<UpdateMetadata>,
    error: UpdateError,
}

impl ErrorState {
    pub fn new(
        api_client: ApiClient,
        update_metadata: Option<UpdateMetadata>,
        error: UpdateError,
    ) -> Self {
        Self {
            api_client,
            update_metadata,
            error,
        }
    }

    pub fn update_metadata(&self) -> Option<&UpdateMetadata> {
        self.update_metadata.as_ref()
    }

    pub fn error(&self) -> &UpdateError {
        &self.error
    }

    pub(super) fn handle(self, ctx: &mut Context) -> (State, bool) {
        match self.error.severity() {
            Severity::Transient => {
                warn!("update failed, will retry: {:?}", self.error.cause());
                ctx.runtime.record_transient_failure();
                (Idle::new(self.api_client).into(), false)
            }
            Severity::Fatal => {
                error!("update failed fatally: {:?}", self.error.cause());
                (Exit::failed(self.error).into(), false)
            }
        }
    }
}
