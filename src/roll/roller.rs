use rand::{rngs::SmallRng, Rng, SeedableRng};

use super::types::{DiceConfiguration, RollResult};

/// Source of face values for a roll session.
///
/// Implementors only need `roll_in_range`; `roll` draws one value per die.
pub trait Roller: Send {
    fn roll_in_range(&mut self, max: u32) -> u32;

    fn roll(&mut self, config: &DiceConfiguration) -> RollResult {
        (0..config.get_dice())
            .map(|_| self.roll_in_range(config.get_faces()))
            .collect::<Vec<_>>()
            .into()
    }
}

/// Uniform, non-cryptographic dice. Owns its generator so it can move onto
/// the session task.
pub struct RandomDiceSource {
    rng: SmallRng,
}

impl RandomDiceSource {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_rng(&mut rand::rng()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomDiceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Roller for RandomDiceSource {
    fn roll_in_range(&mut self, max: u32) -> u32 {
        self.rng.random_range(1..=max)
    }
}

/// Replays a fixed list of face values, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct SequenceRoller {
    values: Vec<u32>,
    next: usize,
}

impl SequenceRoller {
    /// Panics if `values` is empty.
    pub fn new(values: Vec<u32>) -> Self {
        assert!(!values.is_empty(), "SequenceRoller needs at least one value");
        Self { values, next: 0 }
    }
}

impl Roller for SequenceRoller {
    fn roll_in_range(&mut self, _max: u32) -> u32 {
        let value = self.values[self.next];
        self.next = (self.next + 1) % self.values.len();
        value
    }
}
