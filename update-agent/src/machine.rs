//! The control loop driving the update state machine.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tracing::{debug, info};

use crate::{
    client::{ApiClient, DeviceIdentity},
    errors::UpdateError,
    filesystem::FilesystemManager,
    installer::InstallModeRegistry,
    rebooter::Rebooter,
    runtime::RuntimeState,
    settings::Settings,
    states::{Exit, Idle, State, StateId},
};

/// Granularity at which sleeping states re-check the cancellation flag.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Requests cancellation of the in-flight update. Safe to call from any
/// thread; the state machine honors it at the next cancellation checkpoint
/// by abandoning the update and parking at `Idle`.
#[derive(Clone, Debug)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Everything the transition functions need besides their own data: the
/// collaborators handed in at construction and the runtime bookkeeping.
pub struct Context {
    pub settings: Settings,
    pub filesystem: FilesystemManager,
    pub rebooter: Box<dyn Rebooter>,
    pub registry: InstallModeRegistry,
    pub runtime: RuntimeState,
    cancel: Arc<AtomicBool>,
}

impl Context {
    pub fn new(
        settings: Settings,
        filesystem: FilesystemManager,
        rebooter: Box<dyn Rebooter>,
        registry: InstallModeRegistry,
    ) -> Self {
        let runtime = RuntimeState::load(settings.runtime_state.clone());
        Self {
            settings,
            filesystem,
            rebooter,
            registry,
            runtime,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    // An honored cancellation consumes the request; the next update runs
    // normally.
    fn clear_cancellation(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    /// Sleeps for `duration`, returning early when cancellation is
    /// requested. The return value reports whether it was.
    pub(crate) fn sleep_observing_cancel(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.cancelled() {
                return true;
            }
            let step = remaining.min(CANCEL_POLL_INTERVAL);
            std::thread::sleep(step);
            remaining -= step;
        }
        self.cancelled()
    }

    pub(crate) fn device_identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            product_uid: self.settings.product_uid.clone(),
            device_id: self.settings.device_id.clone(),
            hardware: self.settings.hardware.clone(),
        }
    }
}

/// The orchestrator: owns the current state and repeatedly applies its
/// transition function until a terminal state is reached.
pub struct UpdateAgent {
    context: Context,
    api_client: ApiClient,
    current_state: State,
}

impl UpdateAgent {
    /// Construction requires the API client and the reboot capability; update
    /// metadata only ever enters through a successful update check.
    pub fn new(
        api_client: ApiClient,
        rebooter: Box<dyn Rebooter>,
        filesystem: FilesystemManager,
        registry: InstallModeRegistry,
        settings: Settings,
    ) -> Self {
        Self {
            context: Context::new(settings, filesystem, rebooter, registry),
            current_state: State::Idle(Idle::new(api_client.clone())),
            api_client,
        }
    }

    pub fn current_state(&self) -> &State {
        &self.current_state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.context.cancel_handle()
    }

    /// The fatal error that terminated the loop, if any.
    pub fn fatal_failure(&self) -> Option<&UpdateError> {
        match &self.current_state {
            State::Exit(exit) => exit.failure(),
            _ => None,
        }
    }

    /// Performs a single state transition.
    pub fn step(&mut self) {
        // Placeholder only; `handle` consumes the state and the machine is
        // single-threaded, so the placeholder is never observable.
        let state = std::mem::replace(&mut self.current_state, State::Exit(Exit::clean()));
        let id = state.id();
        let (next, cancelled) = state.handle(&mut self.context);
        debug!("transition: {id} -> {} (cancelled: {cancelled})", next.id());

        // Cancellation is only honored where the next state is safe to
        // abandon; the in-flight update is dropped and the agent parks at
        // `Idle` until the next polling cycle.
        self.current_state = if cancelled && next.id().is_cancellation_checkpoint() {
            info!("cancellation honored at checkpoint `{}`; abandoning update", next.id());
            self.context.clear_cancellation();
            State::Idle(Idle::new(self.api_client.clone()))
        } else {
            next
        };
    }

    /// Drives the loop until a terminal state is reached.
    pub fn run(&mut self) {
        info!("starting update agent control loop");
        while self.current_state.id() != StateId::Exit {
            self.step();
        }
        info!("update agent control loop finished");
    }
}
