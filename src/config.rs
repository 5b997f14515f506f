use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSecondsWithFrac, serde_as};

use crate::actions::{ActionSpace, RaiseScheme};
use crate::observation::{FeatureLayout, Normalization, ObservationEncoder};

/// Curated raise sizes in half-big-blind units; scaled by the big blind and
/// capped at the starting stack.
const STRATEGIC_HALF_BLINDS: [u32; 14] = [2, 3, 4, 6, 8, 12, 16, 20, 25, 30, 40, 50, 75, 100];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid raise scheme: {0}")]
    RaiseScheme(String),
    #[error("invalid feature layout: {0}")]
    Layout(String),
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    /// 200-wide observations with linear raise sizing.
    Compact,
    /// 250-wide observations with strategic raise sizing.
    #[default]
    Extended,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Stakes {
    pub starting_stack: u32,
    pub big_blind: u32,
    pub small_blind: u32,
}

impl Default for Stakes {
    fn default() -> Self {
        Self {
            starting_stack: 400,
            big_blind: 2,
            small_blind: 1,
        }
    }
}

/// Observation layout and raise addressing, chosen together.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub kind: ProfileKind,
    pub layout: FeatureLayout,
    pub raises: RaiseScheme,
}

impl Profile {
    pub fn compact(stakes: &Stakes) -> Result<Self, ConfigError> {
        Ok(Self {
            kind: ProfileKind::Compact,
            layout: FeatureLayout::compact(),
            raises: RaiseScheme::linear(stakes.big_blind, stakes.starting_stack)?,
        })
    }

    pub fn extended(stakes: &Stakes) -> Result<Self, ConfigError> {
        Self::extended_with(stakes, default_strategic_sizes(stakes))
    }

    pub fn extended_with(stakes: &Stakes, sizes: Vec<u32>) -> Result<Self, ConfigError> {
        Ok(Self {
            kind: ProfileKind::Extended,
            layout: FeatureLayout::extended(),
            raises: RaiseScheme::strategic(sizes, stakes.big_blind, stakes.starting_stack)?,
        })
    }
}

pub fn default_strategic_sizes(stakes: &Stakes) -> Vec<u32> {
    let mut sizes: Vec<u32> = STRATEGIC_HALF_BLINDS
        .iter()
        .map(|half_blinds| (half_blinds * stakes.big_blind / 2).max(stakes.big_blind))
        .filter(|size| *size <= stakes.starting_stack)
        .collect();
    sizes.dedup();
    sizes
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub profile: ProfileKind,
    pub stakes: Stakes,
    pub game_clock_secs: f64,
    pub max_raises: u32,
    /// Overrides the curated raise sizes of the extended profile.
    pub strategic_raises: Option<Vec<u32>>,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub connect_timeout: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub read_timeout: Duration,
    pub connection_penalty: f32,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            profile: ProfileKind::Extended,
            stakes: Stakes::default(),
            game_clock_secs: 600.0,
            max_raises: 4,
            strategic_raises: None,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            connection_penalty: -1.0,
        }
    }
}

impl EnvConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EnvConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.profile()?;
        Ok(config)
    }

    pub fn profile(&self) -> Result<Profile, ConfigError> {
        match (self.profile, &self.strategic_raises) {
            (ProfileKind::Compact, _) => Profile::compact(&self.stakes),
            (ProfileKind::Extended, Some(sizes)) => {
                Profile::extended_with(&self.stakes, sizes.clone())
            }
            (ProfileKind::Extended, None) => Profile::extended(&self.stakes),
        }
    }

    pub fn normalization(&self) -> Normalization {
        Normalization {
            game_clock: self.game_clock_secs,
            starting_stack: self.stakes.starting_stack,
            big_blind: self.stakes.big_blind,
            max_raises: self.max_raises,
        }
    }

    pub fn encoder(&self) -> Result<ObservationEncoder, ConfigError> {
        ObservationEncoder::new(self.profile()?.layout, self.normalization())
    }

    pub fn action_space(&self) -> Result<ActionSpace, ConfigError> {
        Ok(ActionSpace::new(self.profile()?.raises))
    }
}
