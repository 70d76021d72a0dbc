use crate::roll::{ConfigurationError, SessionId};
use thiserror::Error;

/// Why `RollController::start` refused to start a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RollError {
    #[error("invalid dice configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("session {0} is still rolling")]
    SessionAlreadyActive(SessionId),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Roll error: {0}")]
    Roll(#[from] RollError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
