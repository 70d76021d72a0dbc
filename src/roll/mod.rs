pub mod buffer;
pub mod observer;
pub mod roller;
pub mod session;
pub mod types;

#[cfg(test)]
mod tests;

pub use buffer::ResultBuffer;
pub use observer::{ChannelObserver, RollEvent, Termination, TerminationReason, Tick, TickObserver};
pub use roller::{RandomDiceSource, Roller, SequenceRoller};
pub use session::{RollSession, SessionHandle, TICK_INTERVAL};
pub use types::{
    ConfigurationError, DiceConfiguration, DiceSelection, RollMode, RollResult, SessionId, SessionState,
    DEFAULT_SINGLE_ROLL_TICKS, FACE_OPTIONS, MAX_DICE,
};
