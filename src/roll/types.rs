use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Face counts offered by the dice picker.
pub const FACE_OPTIONS: &[u32] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 15, 16, 18, 20, 21, 22, 25, 28, 30, 35, 36, 40, 42, 44, 45, 48, 49, 50, 55,
    56, 60, 62, 70, 72, 75, 79, 80, 81, 82, 83, 84, 85, 86, 87, 88, 90, 92, 94, 95, 96, 98, 100, 101, 102, 103, 105,
    110, 111, 112, 116, 120, 121, 122, 123, 124, 125, 130, 131, 132, 135, 140, 144,
];

/// Largest die count offered by the dice picker.
pub const MAX_DICE: u32 = 15;

/// Ticks animated by a single roll.
pub const DEFAULT_SINGLE_ROLL_TICKS: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)] // Serialize directly as the inner UUID string
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no face count selected")]
    MissingFaces,
    #[error("no dice count selected")]
    MissingDice,
    #[error("a die needs at least 2 faces, got {0}")]
    TooFewFaces(u32),
    #[error("at least one die is required")]
    NoDice,
    #[error("a bounded roll needs at least one tick")]
    EmptyTickBudget,
}

/// Raw face/dice choice as it comes from the presentation layer.
/// Either side may still be unselected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceSelection {
    pub faces: Option<u32>,
    pub dice: Option<u32>,
}

impl DiceSelection {
    pub fn new(faces: u32, dice: u32) -> Self {
        Self {
            faces: Some(faces),
            dice: Some(dice),
        }
    }

    /// True when both values are among the options the dice picker offers.
    pub fn is_standard(&self) -> bool {
        matches!(
            (self.faces, self.dice),
            (Some(f), Some(d)) if FACE_OPTIONS.contains(&f) && (1..=MAX_DICE).contains(&d)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiceConfiguration {
    faces: u32,
    dice: u32,
}

impl DiceConfiguration {
    pub fn new(faces: u32, dice: u32) -> Result<Self, ConfigurationError> {
        if faces < 2 {
            return Err(ConfigurationError::TooFewFaces(faces));
        }
        if dice == 0 {
            return Err(ConfigurationError::NoDice);
        }
        Ok(Self { faces, dice })
    }

    pub fn get_faces(&self) -> u32 {
        self.faces
    }

    pub fn get_dice(&self) -> u32 {
        self.dice
    }

    /// Whether `result` could have been rolled with this configuration.
    pub fn admits(&self, result: &RollResult) -> bool {
        result.len() == self.dice as usize && result.values().iter().all(|v| (1..=self.faces).contains(v))
    }
}

impl TryFrom<DiceSelection> for DiceConfiguration {
    type Error = ConfigurationError;

    fn try_from(selection: DiceSelection) -> Result<Self, Self::Error> {
        let faces = selection.faces.ok_or(ConfigurationError::MissingFaces)?;
        let dice = selection.dice.ok_or(ConfigurationError::MissingDice)?;
        Self::new(faces, dice)
    }
}

/// Face values of one tick, in die order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RollResult(Vec<u32>);

impl RollResult {
    pub fn new(values: Vec<u32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> u64 {
        self.0.iter().map(|&v| u64::from(v)).sum()
    }
}

impl From<Vec<u32>> for RollResult {
    fn from(values: Vec<u32>) -> Self {
        Self(values)
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for value in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{value}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollMode {
    /// Roll until cancelled.
    Continuous,
    /// Roll a fixed number of ticks, then settle.
    Bounded(u32),
}

impl RollMode {
    pub fn single() -> Self {
        RollMode::Bounded(DEFAULT_SINGLE_ROLL_TICKS)
    }

    pub(crate) fn validate(self) -> Result<Self, ConfigurationError> {
        match self {
            RollMode::Bounded(0) => Err(ConfigurationError::EmptyTickBudget),
            mode => Ok(mode),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
    Terminated,
}

impl SessionState {
    /// Running or Stopping: the session still owns its buffer.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Running | SessionState::Stopping)
    }
}
