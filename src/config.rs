use serde::Deserialize;
use std::env;

use crate::roll::{DiceSelection, RollMode, DEFAULT_SINGLE_ROLL_TICKS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeConfig {
    Single,
    Continuous,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollConfig {
    // Left unset, these surface as a configuration error at start
    pub faces: Option<u32>,
    pub dice: Option<u32>,
    pub mode: ModeConfig,
    #[serde(default = "default_single_roll_ticks")]
    pub single_roll_ticks: u32,
    #[serde(default)]
    pub show_sum: bool,
}

fn default_single_roll_ticks() -> u32 {
    DEFAULT_SINGLE_ROLL_TICKS
}

impl RollConfig {
    pub fn selection(&self) -> DiceSelection {
        DiceSelection {
            faces: self.faces,
            dice: self.dice,
        }
    }

    pub fn roll_mode(&self) -> RollMode {
        match self.mode {
            ModeConfig::Single => RollMode::Bounded(self.single_roll_ticks),
            ModeConfig::Continuous => RollMode::Continuous,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub roll: RollConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = env::var("RUN_ENV").unwrap_or_else(|_| "local".into());

        let builder = ::config::Config::builder()
            .add_source(config::File::with_name("config/default.toml"))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::File::with_name("config/local.toml").required(false))
            .add_source(
                config::Environment::with_prefix("DICE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}
