pub mod config;
pub mod controller;
pub mod error;
pub mod roll;

pub use controller::RollController;
pub use error::{AppError, RollError};
