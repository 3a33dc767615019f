use crate::{client::ApiClient, machine::Context, states::{Poll, State}};

/// Waiting for the poll timer. The agent spends most of its life here.
#[derive(Debug, PartialEq)]
pub struct Idle {
    api_client: ApiClient,
}

impl Idle {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }

    pub(super) fn handle(self, ctx: &mut Context) -> (State, bool) {
        let cancelled = ctx.sleep_observing_cancel(ctx.settings.polling_interval);
        (Poll::new(self.api_client).into(), cancelled)
    }
}
