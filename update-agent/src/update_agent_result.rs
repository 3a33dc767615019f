use std::process::{ExitCode, Termination};

use ota_update_agent::errors::{Severity, UpdateError};

/// Exit codes returned by the update agent. Custom exit codes are taken in accordance with the
/// Linux Standard Base Core Specification and are in the range 150-199.
#[repr(u8)]
pub(crate) enum UpdateAgentResult {
    Success = 0,
    Failure = 1,
    FatalUpdateError = 150,
}

impl Termination for UpdateAgentResult {
    fn report(self) -> ExitCode {
        ExitCode::from(self as u8)
    }
}

impl From<&UpdateError> for UpdateAgentResult {
    fn from(err: &UpdateError) -> Self {
        match err.severity() {
            Severity::Fatal => UpdateAgentResult::FatalUpdateError,
            Severity::Transient => UpdateAgentResult::Failure,
        }
    }
}
