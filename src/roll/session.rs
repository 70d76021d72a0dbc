use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use super::buffer::ResultBuffer;
use super::observer::{Termination, TerminationReason, Tick, TickObserver};
use super::roller::Roller;
use super::types::{ConfigurationError, DiceConfiguration, RollMode, RollResult, SessionId, SessionState};

/// Time between two ticks of a running session.
pub const TICK_INTERVAL: Duration = Duration::from_millis(15);

type StateCell = Arc<watch::Sender<SessionState>>;
type ExitCell = Arc<watch::Sender<bool>>;

/// One roll, from `Idle` to `Terminated`.
///
/// State only changes through the transition helpers below, all of which go
/// through the session's own watch channel. `start` consumes the session, so a
/// terminated session cannot be restarted.
pub struct RollSession {
    id: SessionId,
    config: DiceConfiguration,
    mode: RollMode,
    roller: Box<dyn Roller>,
    buffer: Arc<ResultBuffer>,
    observer: Arc<dyn TickObserver>,
    state: StateCell,
    exited: ExitCell,
}

impl RollSession {
    pub fn new(
        config: DiceConfiguration,
        mode: RollMode,
        roller: Box<dyn Roller>,
        observer: Arc<dyn TickObserver>,
    ) -> Result<Self, ConfigurationError> {
        let mode = mode.validate()?;
        let (state, _) = watch::channel(SessionState::Idle);
        let (exited, _) = watch::channel(false);

        Ok(Self {
            id: SessionId::new(),
            config,
            mode,
            roller,
            buffer: Arc::new(ResultBuffer::new()),
            observer,
            state: Arc::new(state),
            exited: Arc::new(exited),
        })
    }

    pub fn get_id(&self) -> SessionId {
        self.id
    }

    pub fn get_state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// The buffer this session will write to, available before `start`.
    pub fn buffer(&self) -> Arc<ResultBuffer> {
        self.buffer.clone()
    }

    /// Moves the session to `Running` and spawns its timing loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> SessionHandle {
        self.state.send_replace(SessionState::Running);
        tracing::info!(
            session_id = %self.id,
            faces = self.config.get_faces(),
            dice = self.config.get_dice(),
            mode = ?self.mode,
            "Roll session started"
        );

        let handle = SessionHandle {
            id: self.id,
            config: self.config,
            mode: self.mode,
            buffer: self.buffer.clone(),
            state: self.state.clone(),
            exited: self.exited.clone(),
        };
        tokio::spawn(self.run());
        handle
    }

    async fn run(mut self) {
        // Dropped last: the task is gone once `exited` flips, panic or not
        let exit = ExitGuard {
            state: self.state.clone(),
            exited: self.exited.clone(),
        };

        let mut ticks = 0u32;
        let mut last: Option<RollResult> = None;
        let reason = match AssertUnwindSafe(self.tick_loop(&mut ticks, &mut last))
            .catch_unwind()
            .await
        {
            Ok(reason) => reason,
            Err(_) => {
                tracing::error!(session_id = %self.id, ticks, "Roll session panicked");
                TerminationReason::Aborted
            }
        };

        terminate(&self.state);
        tracing::info!(session_id = %self.id, ticks, reason = ?reason, "Roll session terminated");
        self.observer.on_terminated(&Termination {
            session_id: self.id,
            ticks,
            last,
            reason,
        });

        drop(self);
        drop(exit);
    }

    async fn tick_loop(&mut self, ticks: &mut u32, last: &mut Option<RollResult>) -> TerminationReason {
        let mut state_rx = self.state.subscribe();
        let mut interval = time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = state_rx.wait_for(|s| *s != SessionState::Running) => {}
                _ = interval.tick() => {}
            }

            if self.get_state() != SessionState::Running {
                return TerminationReason::Cancelled;
            }

            let result = self.roller.roll(&self.config);
            debug_assert!(self.config.admits(&result), "roller produced {result:?} for {:?}", self.config);
            self.buffer.write(result.clone());
            *ticks += 1;

            let exhausted = matches!(self.mode, RollMode::Bounded(budget) if *ticks >= budget);
            let stopping = self.get_state() == SessionState::Stopping;
            let tick = Tick {
                session_id: self.id,
                index: *ticks,
                result,
                terminal: exhausted || stopping,
            };
            tracing::trace!(session_id = %self.id, index = *ticks, result = %tick.result, "tick");
            self.observer.on_tick(&tick);
            *last = Some(tick.result);

            if exhausted {
                return TerminationReason::Exhausted;
            }
            if stopping {
                return TerminationReason::Cancelled;
            }
        }
    }
}

/// Running -> Stopping. Returns false when the session was not running.
fn request_stop(state: &watch::Sender<SessionState>) -> bool {
    state.send_if_modified(|s| {
        if *s == SessionState::Running {
            *s = SessionState::Stopping;
            true
        } else {
            false
        }
    })
}

fn terminate(state: &watch::Sender<SessionState>) -> bool {
    state.send_if_modified(|s| {
        if *s == SessionState::Terminated {
            false
        } else {
            *s = SessionState::Terminated;
            true
        }
    })
}

struct ExitGuard {
    state: StateCell,
    exited: ExitCell,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        terminate(&self.state);
        self.exited.send_replace(true);
    }
}

/// Caller's view of a started session. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    config: DiceConfiguration,
    mode: RollMode,
    buffer: Arc<ResultBuffer>,
    state: StateCell,
    exited: ExitCell,
}

impl SessionHandle {
    pub fn get_id(&self) -> SessionId {
        self.id
    }

    pub fn get_config(&self) -> DiceConfiguration {
        self.config
    }

    pub fn get_mode(&self) -> RollMode {
        self.mode
    }

    pub fn get_state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// The buffer this session writes to. Stays readable after the session
    /// terminates.
    pub fn buffer(&self) -> Arc<ResultBuffer> {
        self.buffer.clone()
    }

    /// Asks the timing loop to stop after the tick in flight, without waiting.
    pub fn request_stop(&self) -> bool {
        let requested = request_stop(&self.state);
        if requested {
            tracing::debug!(session_id = %self.id, "Stop requested");
        }
        requested
    }

    /// True once the session task has returned, `on_terminated` included.
    /// Implies `Terminated`.
    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    /// Resolves once the session is `Terminated` and its task has exited.
    pub async fn wait(&self) {
        let mut rx = self.exited.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|exited| *exited).await;
    }

    /// Requests cancellation and waits for the task to exit. No-op on a
    /// session that already exited.
    pub async fn stop(&self) {
        if self.has_exited() {
            return;
        }
        self.request_stop();
        self.wait().await;
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("mode", &self.mode)
            .field("state", &self.get_state())
            .field("exited", &self.has_exited())
            .finish()
    }
}
