use std::time::Duration;

use tracing::debug;

use crate::{
    client::ApiClient,
    machine::Context,
    states::{State, UpdateCheck},
};

/// Base penalty applied after the first consecutive transient failure.
const BACKOFF_BASE: Duration = Duration::from_secs(10);
/// Upper bound on the backoff penalty.
const BACKOFF_CAP: Duration = Duration::from_secs(600);

/// Waiting for the next scheduled server check. On top of the regular poll
/// timer (spent in `Idle`), this state serves the backoff penalty after
/// transient failures and any extra delay the server requested.
#[derive(Debug, PartialEq)]
pub struct Poll {
    api_client: ApiClient,
}

impl Poll {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }

    pub(super) fn handle(self, ctx: &mut Context) -> (State, bool) {
        let mut delay = backoff_penalty(ctx.runtime.transient_failures());
        if let Some(extra_poll) = ctx.runtime.take_extra_poll() {
            delay += extra_poll;
        }

        let cancelled = if delay.is_zero() {
            ctx.cancelled()
        } else {
            debug!("delaying next update check by {delay:?}");
            ctx.sleep_observing_cancel(delay)
        };
        (UpdateCheck::new(self.api_client).into(), cancelled)
    }
}

/// Exponential backoff penalty for `failures` consecutive transient errors.
fn backoff_penalty(failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(failures - 1))
        .min(BACKOFF_CAP)
}
