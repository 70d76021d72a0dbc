use std::sync::{Arc, Mutex, PoisonError};

use tracing::instrument;

use crate::error::RollError;
use crate::roll::{
    DiceConfiguration, DiceSelection, RandomDiceSource, RollMode, RollSession, Roller, SessionHandle, TickObserver,
};

type RollerFactory = dyn Fn() -> Box<dyn Roller> + Send + Sync;

/// Starts and stops roll sessions, one at a time.
pub struct RollController {
    roller_factory: Arc<RollerFactory>,
    active: Mutex<Option<SessionHandle>>,
}

impl Default for RollController {
    fn default() -> Self {
        Self::with_roller(|| Box::new(RandomDiceSource::new()))
    }
}

impl RollController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `factory` to build the dice source of every new session.
    pub fn with_roller<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn Roller> + Send + Sync + 'static,
    {
        Self {
            roller_factory: Arc::new(factory),
            active: Mutex::new(None),
        }
    }

    /// Validates `selection` and starts a new session.
    ///
    /// Fails without touching any buffer when the selection is incomplete or
    /// out of range, or when the previous session's task has not exited yet.
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self, observer))]
    pub fn start(
        &self,
        selection: DiceSelection,
        mode: RollMode,
        observer: impl TickObserver,
    ) -> Result<SessionHandle, RollError> {
        let config = DiceConfiguration::try_from(selection).inspect_err(|e| {
            tracing::warn!(error = %e, "Rejected roll configuration");
        })?;
        let mode = mode.validate()?;

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        // Terminated is not enough: the old task may still be inside `on_terminated`
        if let Some(current) = active.as_ref() {
            if !current.has_exited() {
                tracing::debug!(
                    session_id = %current.get_id(),
                    state = ?current.get_state(),
                    "Start ignored, previous session has not exited"
                );
                return Err(RollError::SessionAlreadyActive(current.get_id()));
            }
        }

        let session = RollSession::new(config, mode, (self.roller_factory)(), Arc::new(observer))?;
        let handle = session.start();
        *active = Some(handle.clone());
        Ok(handle)
    }

    /// Stops `handle` and waits until its task has exited. Stopping an
    /// exited session does nothing.
    #[instrument(skip(self, handle), fields(session_id = %handle.get_id()))]
    pub async fn stop(&self, handle: &SessionHandle) {
        handle.stop().await;
    }

    /// Stops whatever session is current, if any.
    pub async fn stop_active(&self) {
        if let Some(handle) = self.active() {
            self.stop(&handle).await;
        }
    }

    /// The most recently started session, terminated or not.
    pub fn active(&self) -> Option<SessionHandle> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Drop for RollController {
    fn drop(&mut self) {
        // Continuous sessions would otherwise roll forever
        let active = self.active.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = active.take() {
            handle.request_stop();
        }
    }
}
