pub mod actions;
pub mod cards;
pub mod config;
pub mod engine;
pub mod env;
pub mod observation;
pub mod protocol;
pub mod runner;
pub mod transport;
pub mod web;

pub use actions::{ACTION_SPACE_SIZE, ActionSpace, RaiseScheme};
pub use config::{EnvConfig, Profile, ProfileKind};
pub use env::{EnvError, EnvState, PokerEnv, StepOutcome};
pub use observation::ObservationEncoder;
pub use protocol::{ActionToken, StateMessage, parse_line};
