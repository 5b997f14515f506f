use std::fmt::Write as _;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actions::ActionSpace;
use crate::config::{ConfigError, EnvConfig};
use crate::engine::{Engine, EngineError};
use crate::observation::{ObservationEncoder, Street};
use crate::protocol::{StateMessage, parse_line};
use crate::transport::{Transport, TransportError};

/// Blank lines tolerated while waiting for the first message of an episode.
const MAX_BLANK_LINES: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("engine unavailable: {0}")]
    Engine(#[from] EngineError),
    #[error("engine sent no initial message: {0}")]
    NoInitialMessage(String),
    #[error("step called while {0:?}; call reset first")]
    NotInHand(EnvState),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnvState {
    Idle,
    AwaitingEngine,
    InHand,
    Terminal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepOutcome {
    pub observation: Vec<f32>,
    pub reward: f32,
    pub done: bool,
}

/// Reinforcement-learning view of one engine connection.
pub struct PokerEnv<E: Engine> {
    engine: E,
    transport: Option<E::Transport>,
    encoder: ObservationEncoder,
    actions: ActionSpace,
    config: EnvConfig,
    state: EnvState,
    observation: Vec<f32>,
    last_message: Option<StateMessage>,
    link_failed: bool,
}

impl<E: Engine> PokerEnv<E> {
    pub fn new(engine: E, config: EnvConfig) -> Result<Self, ConfigError> {
        let encoder = config.encoder()?;
        let actions = config.action_space()?;
        let observation = vec![0.0; encoder.len()];
        Ok(Self {
            engine,
            transport: None,
            encoder,
            actions,
            config,
            state: EnvState::Idle,
            observation,
            last_message: None,
            link_failed: false,
        })
    }

    pub fn state(&self) -> EnvState {
        self.state
    }

    pub fn observation(&self) -> &[f32] {
        &self.observation
    }

    pub fn last_message(&self) -> Option<&StateMessage> {
        self.last_message.as_ref()
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.actions
    }

    pub fn encoder(&self) -> &ObservationEncoder {
        &self.encoder
    }

    /// Whether the current episode ended because the engine link failed.
    pub fn link_failed(&self) -> bool {
        self.link_failed
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn drain_engine_output(&mut self) -> Vec<String> {
        self.engine.drain_output()
    }

    /// Starts a new episode. The only entry point that reports engine
    /// failures as errors.
    pub fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
        self.close();
        self.state = EnvState::AwaitingEngine;
        self.observation.fill(0.0);
        self.last_message = None;
        self.link_failed = false;

        let mut transport = match self.engine.start() {
            Ok(transport) => transport,
            Err(err) => {
                self.state = EnvState::Idle;
                return Err(err.into());
            }
        };

        let message = match first_message(&mut transport) {
            Ok(message) => message,
            Err(reason) => {
                self.engine.stop();
                self.state = EnvState::Idle;
                return Err(EnvError::NoInitialMessage(reason));
            }
        };

        self.transport = Some(transport);
        self.absorb(message);
        self.state = if self.is_game_over() {
            EnvState::Terminal
        } else {
            EnvState::InHand
        };
        info!(state = ?self.state, "episode started");
        Ok(self.observation.clone())
    }

    pub fn step(&mut self, action: usize) -> Result<StepOutcome, EnvError> {
        match self.state {
            EnvState::InHand => {}
            EnvState::Terminal => return Ok(self.outcome(0.0, true)),
            state => return Err(EnvError::NotInHand(state)),
        }

        let token = self.actions.decode(action);
        let Some(transport) = self.transport.as_mut() else {
            return Ok(self.fail("no engine connection"));
        };
        if let Err(err) = transport.send_action(&token) {
            return Ok(self.fail(&err.to_string()));
        }

        let message = match transport.recv_line() {
            Ok(Some(line)) => parse_line(&line),
            Ok(None) => return Ok(self.fail(&TransportError::Closed.to_string())),
            Err(err) => return Ok(self.fail(&err.to_string())),
        };
        let Some(message) = message else {
            return Ok(self.fail("engine sent an empty line"));
        };

        let reward = message
            .bankroll_delta
            .map(|delta| delta as f32 / self.config.stakes.starting_stack.max(1) as f32)
            .unwrap_or(0.0);
        self.absorb(message);
        let done = self.is_game_over();
        if done {
            self.state = EnvState::Terminal;
            debug!(reward, "episode finished");
        }
        Ok(self.outcome(reward, done))
    }

    pub fn legal_actions(&self) -> Vec<usize> {
        self.actions.legal_actions(self.last_message.as_ref())
    }

    pub fn legal_mask(&self) -> Vec<bool> {
        self.actions.legal_mask(self.last_message.as_ref())
    }

    /// Human-readable dump of the current state. Format is not stable.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Poker env [{:?}] observation width {}",
            self.state,
            self.observation.len()
        );
        let Some(message) = &self.last_message else {
            out.push_str("No current message\n");
            return out;
        };
        let cards = |tokens: &[String]| {
            if tokens.is_empty() {
                "--".to_string()
            } else {
                tokens.join(" ")
            }
        };
        let _ = writeln!(
            out,
            "Time {:.3} | Player {} | Street {:?}",
            message.time_remaining.unwrap_or(0.0),
            message.player_index.unwrap_or(0),
            Street::from_board_len(message.board_cards.len())
        );
        let _ = writeln!(
            out,
            "Hole {} | Board {} | Opponent {}",
            cards(&message.hole_cards),
            cards(&message.board_cards),
            cards(&message.opponent_hand)
        );
        let _ = writeln!(
            out,
            "History {} | Delta {} | Game over {}",
            message.action_history.iter().join(" "),
            message.bankroll_delta.unwrap_or(0),
            message.game_over
        );
        out
    }

    /// Releases the connection and stops the engine. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.transport.take().is_some() || self.engine.is_running() {
            self.engine.stop();
            debug!("engine connection released");
        }
        self.state = EnvState::Idle;
    }

    fn absorb(&mut self, message: StateMessage) {
        self.encoder.encode_into(&message, &mut self.observation);
        self.last_message = Some(message);
    }

    fn is_game_over(&self) -> bool {
        self.last_message.as_ref().is_some_and(|m| m.game_over)
    }

    fn outcome(&self, reward: f32, done: bool) -> StepOutcome {
        StepOutcome {
            observation: self.observation.clone(),
            reward,
            done,
        }
    }

    fn fail(&mut self, reason: &str) -> StepOutcome {
        warn!(reason, "engine link failed; ending episode");
        self.transport = None;
        self.engine.stop();
        self.state = EnvState::Terminal;
        self.link_failed = true;
        self.outcome(self.config.connection_penalty, true)
    }
}

impl<E: Engine> Drop for PokerEnv<E> {
    fn drop(&mut self) {
        self.close();
    }
}

fn first_message<T: Transport>(transport: &mut T) -> Result<StateMessage, String> {
    for _ in 0..=MAX_BLANK_LINES {
        match transport.recv_line() {
            Ok(Some(line)) => {
                if let Some(message) = parse_line(&line) {
                    return Ok(message);
                }
            }
            Ok(None) => return Err(TransportError::Closed.to_string()),
            Err(err) => return Err(err.to_string()),
        }
    }
    Err("only blank lines received".to_string())
}
