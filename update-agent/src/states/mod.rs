//! The states of the update lifecycle.
//!
//! Each state is an immutable value carrying only the context it needs; its
//! transition function consumes it and produces the next state together with
//! a flag reporting whether cancellation was observed during the transition.
//! All control-flow and failure-recovery decisions of the update lifecycle
//! live in these transition functions; the loop in
//! [`crate::machine::UpdateAgent`] only applies them.

use ota_update_agent_core::UpdateMetadata;

use crate::{errors::UpdateError, machine::Context};

mod download;
mod error;
mod idle;
mod install;
mod poll;
mod reboot;
mod update_check;

pub use download::Downloading;
pub use error::ErrorState;
pub use idle::Idle;
pub use install::{Install, Installing};
pub use poll::Poll;
pub use reboot::Rebooting;
pub use update_check::UpdateCheck;

/// Stable identity of a state, decoupled from the data it carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateId {
    Idle,
    Poll,
    UpdateCheck,
    Downloading,
    Installing,
    Install,
    Rebooting,
    Error,
    Exit,
}

impl StateId {
    /// States at which an in-flight update may be abandoned without leaving
    /// the device inconsistent. Installing (mid-write) and Rebooting
    /// (post-trigger) are deliberately not checkpoints.
    pub fn is_cancellation_checkpoint(self) -> bool {
        matches!(self, StateId::Idle | StateId::Poll | StateId::Downloading)
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StateId::Idle => "idle",
            StateId::Poll => "poll",
            StateId::UpdateCheck => "update-check",
            StateId::Downloading => "downloading",
            StateId::Installing => "installing",
            StateId::Install => "install",
            StateId::Rebooting => "rebooting",
            StateId::Error => "error",
            StateId::Exit => "exit",
        })
    }
}

/// Terminal state; the control loop stops once it is reached.
#[derive(Debug, Default, PartialEq)]
pub struct Exit {
    failure: Option<UpdateError>,
}

impl Exit {
    /// Termination without a failure.
    pub fn clean() -> Self {
        Self { failure: None }
    }

    /// Termination forced by a fatal error.
    pub fn failed(failure: UpdateError) -> Self {
        Self {
            failure: Some(failure),
        }
    }

    pub fn failure(&self) -> Option<&UpdateError> {
        self.failure.as_ref()
    }
}

#[derive(Debug, PartialEq)]
pub enum State {
    Idle(Idle),
    Poll(Poll),
    UpdateCheck(UpdateCheck),
    Downloading(Downloading),
    Installing(Installing),
    Install(Install),
    Rebooting(Rebooting),
    Error(ErrorState),
    Exit(Exit),
}

impl State {
    pub fn id(&self) -> StateId {
        match self {
            State::Idle(_) => StateId::Idle,
            State::Poll(_) => StateId::Poll,
            State::UpdateCheck(_) => StateId::UpdateCheck,
            State::Downloading(_) => StateId::Downloading,
            State::Installing(_) => StateId::Installing,
            State::Install(_) => StateId::Install,
            State::Rebooting(_) => StateId::Rebooting,
            State::Error(_) => StateId::Error,
            State::Exit(_) => StateId::Exit,
        }
    }

    /// Runs this state to completion and produces the next state plus the
    /// observed cancellation flag.
    pub fn handle(self, ctx: &mut Context) -> (State, bool) {
        match self {
            State::Idle(s) => s.handle(ctx),
            State::Poll(s) => s.handle(ctx),
            State::UpdateCheck(s) => s.handle(ctx),
            State::Downloading(s) => s.handle(ctx),
            State::Installing(s) => s.handle(ctx),
            State::Install(s) => s.handle(ctx),
            State::Rebooting(s) => s.handle(ctx),
            State::Error(s) => s.handle(ctx),
            // Terminal; the loop must not call this, but if it does the
            // state machine stays put instead of falling off.
            State::Exit(s) => (State::Exit(s), false),
        }
    }

    /// The update metadata the state is operating on, if any.
    pub fn update_metadata(&self) -> Option<&UpdateMetadata> {
        match self {
            State::Downloading(s) => Some(s.update_metadata()),
            State::Installing(s) => Some(s.update_metadata()),
            State::Install(s) => Some(s.update_metadata()),
            State::Rebooting(s) => s.update_metadata(),
            State::Error(s) => s.update_metadata(),
            State::Idle(_)
            | State::Poll(_)
            | State::UpdateCheck(_)
            | State::Exit(_) => None,
        }
    }
}

macro_rules! impl_from_state {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        $(
            impl From<$ty> for State {
                fn from(state: $ty) -> Self {
                    State::$variant(state)
                }
            }
        )+
    }
}
impl_from_state!(
    Idle(Idle),
    Poll(Poll),
    UpdateCheck(UpdateCheck),
    Downloading(Downloading),
    Installing(Installing),
    Install(Install),
    Rebooting(Rebooting),
    Error(ErrorState),
    Exit(Exit),
);
