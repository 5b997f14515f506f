use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::protocol::{ActionToken, StateMessage};

pub const ACTION_SPACE_SIZE: usize = 103;
pub const FOLD: usize = 0;
pub const CALL: usize = 1;
pub const CHECK: usize = 2;
pub const FIRST_RAISE: usize = 3;
pub const RAISE_SLOTS: usize = ACTION_SPACE_SIZE - FIRST_RAISE;

/// How raise indices `3..103` map onto chip amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RaiseScheme {
    /// Evenly spaced amounts from `min` to `max`.
    Linear { min: u32, max: u32 },
    /// Curated `sizes` for the first slots, then evenly spaced amounts from the
    /// last curated size up to `max`.
    Strategic { sizes: Vec<u32>, min: u32, max: u32 },
}

impl RaiseScheme {
    pub fn linear(min: u32, max: u32) -> Result<Self, ConfigError> {
        let scheme = RaiseScheme::Linear { min, max };
        scheme.validate()?;
        Ok(scheme)
    }

    pub fn strategic(sizes: Vec<u32>, min: u32, max: u32) -> Result<Self, ConfigError> {
        let scheme = RaiseScheme::Strategic { sizes, min, max };
        scheme.validate()?;
        Ok(scheme)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = self.bounds();
        if min == 0 || min > max {
            return Err(ConfigError::RaiseScheme(format!(
                "raise bounds must satisfy 0 < min <= max (min={min}, max={max})"
            )));
        }
        if let RaiseScheme::Strategic { sizes, .. } = self {
            let Some(first) = sizes.first() else {
                return Err(ConfigError::RaiseScheme(
                    "strategic sizes must not be empty".to_string(),
                ));
            };
            if *first != min {
                return Err(ConfigError::RaiseScheme(format!(
                    "first strategic size {first} must equal the minimum raise {min}"
                )));
            }
            if sizes.windows(2).any(|pair| pair[0] > pair[1]) {
                return Err(ConfigError::RaiseScheme(
                    "strategic sizes must be non-decreasing".to_string(),
                ));
            }
            if sizes.iter().any(|size| *size > max) {
                return Err(ConfigError::RaiseScheme(format!(
                    "strategic sizes must not exceed the maximum raise {max}"
                )));
            }
            if sizes.len() >= RAISE_SLOTS {
                return Err(ConfigError::RaiseScheme(format!(
                    "at most {} strategic sizes fit before the linear block",
                    RAISE_SLOTS - 1
                )));
            }
        }
        Ok(())
    }

    pub fn bounds(&self) -> (u32, u32) {
        match self {
            RaiseScheme::Linear { min, max } | RaiseScheme::Strategic { min, max, .. } => {
                (*min, *max)
            }
        }
    }

    /// Amount for raise slot `slot` (`0..RAISE_SLOTS`).
    pub fn amount(&self, slot: usize) -> u32 {
        let slot = slot.min(RAISE_SLOTS - 1) as u64;
        match self {
            RaiseScheme::Linear { min, max } => {
                let span = u64::from(max - min);
                min + (slot * span / (RAISE_SLOTS as u64 - 1)) as u32
            }
            RaiseScheme::Strategic { sizes, max, .. } => {
                let curated = sizes.len() as u64;
                if slot < curated {
                    return sizes[slot as usize];
                }
                let last = sizes.last().copied().unwrap_or(*max);
                let remaining = RAISE_SLOTS as u64 - curated;
                let step = slot - curated + 1;
                last + (step * u64::from(max - last) / remaining) as u32
            }
        }
    }
}

/// Discrete action space shared by every profile: fold, call, check and one
/// hundred raise sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpace {
    raises: RaiseScheme,
}

impl ActionSpace {
    pub fn new(raises: RaiseScheme) -> Self {
        Self { raises }
    }

    pub fn size(&self) -> usize {
        ACTION_SPACE_SIZE
    }

    pub fn raise_scheme(&self) -> &RaiseScheme {
        &self.raises
    }

    /// Total over every index; anything outside the space checks.
    pub fn decode(&self, index: usize) -> ActionToken {
        match index {
            FOLD => ActionToken::Fold,
            CALL => ActionToken::Call,
            CHECK => ActionToken::Check,
            i if i < ACTION_SPACE_SIZE => ActionToken::Raise(self.raises.amount(i - FIRST_RAISE)),
            _ => ActionToken::Check,
        }
    }

    pub fn describe(&self, index: usize) -> String {
        if index >= ACTION_SPACE_SIZE {
            return format!("Unknown action {index}");
        }
        match self.decode(index) {
            ActionToken::Fold => "Fold".to_string(),
            ActionToken::Call => "Call".to_string(),
            ActionToken::Check => "Check".to_string(),
            ActionToken::Raise(amount) => format!("Raise {amount}"),
        }
    }

    /// Conservative legality filter. Without a message every index is legal;
    /// the engine still has the final word.
    pub fn legal_actions(&self, message: Option<&StateMessage>) -> Vec<usize> {
        self.legal_mask(message)
            .into_iter()
            .enumerate()
            .filter_map(|(index, legal)| legal.then_some(index))
            .collect()
    }

    pub fn legal_mask(&self, message: Option<&StateMessage>) -> Vec<bool> {
        let mut mask = vec![true; ACTION_SPACE_SIZE];
        let Some(message) = message else {
            return mask;
        };

        mask[FOLD] = !message.game_over;
        let facing_raise = message.facing_raise();
        mask[CALL] = facing_raise;
        mask[CHECK] = !facing_raise;
        mask
    }
}
