use serde::Serialize;
use tokio::sync::mpsc;

use super::types::{RollResult, SessionId};

/// One published roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tick {
    pub session_id: SessionId,
    /// 1-based position within the session.
    pub index: u32,
    pub result: RollResult,
    /// Set on the last tick the session will ever emit.
    pub terminal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminationReason {
    /// Bounded session used up its tick budget.
    Exhausted,
    /// Stop was requested.
    Cancelled,
    /// The roller or an observer callback panicked mid-tick.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Termination {
    pub session_id: SessionId,
    pub ticks: u32,
    pub last: Option<RollResult>,
    pub reason: TerminationReason,
}

/// Receives every tick of a session, in order, on the session task.
///
/// Calls must return quickly: the next tick is not drawn until `on_tick`
/// returns.
pub trait TickObserver: Send + Sync + 'static {
    fn on_tick(&self, tick: &Tick);

    /// Called once, after the session reached `Terminated`, including when a
    /// tick panicked.
    fn on_terminated(&self, _termination: &Termination) {}
}

impl<F> TickObserver for F
where
    F: Fn(&Tick) + Send + Sync + 'static,
{
    fn on_tick(&self, tick: &Tick) {
        self(tick)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollEvent {
    Tick(Tick),
    Terminated(Termination),
}

pub type RollEventSender = mpsc::UnboundedSender<RollEvent>;

/// Forwards ticks and the final termination to a channel, for consumers
/// living on another task.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: RollEventSender,
}

impl ChannelObserver {
    pub fn new(sender: RollEventSender) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RollEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl TickObserver for ChannelObserver {
    fn on_tick(&self, tick: &Tick) {
        // A dropped receiver just means nobody is watching anymore
        let _ = self.sender.send(RollEvent::Tick(tick.clone()));
    }

    fn on_terminated(&self, termination: &Termination) {
        let _ = self.sender.send(RollEvent::Terminated(termination.clone()));
    }
}
