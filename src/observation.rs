//! Fixed-length feature vectors built from a single [`StateMessage`].
//!
//! A [`FeatureLayout`] names the offset of every feature block. Blocks left at
//! `None` are not written, which is how the compact profile keeps the
//! first-generation 200-wide layout while the extended profile adds street,
//! strength, betting and bounty features at 250 wide.

use serde::{Deserialize, Serialize};

use crate::cards::{Card, card_to_index, parse_cards};
use crate::config::ConfigError;
use crate::protocol::{ActionToken, StateMessage};

pub const STREET_WIDTH: usize = 4;
pub const STRENGTH_WIDTH: usize = 4;
pub const BETTING_WIDTH: usize = 3;
pub const HISTORY_SLOT_WIDTH: usize = 4;
pub const BOUNTY_WIDTH: usize = 2;

const MAX_HOLE_CARDS: usize = 2;

const RANK_SUM_SPAN: f32 = 24.0;
const RANK_SUM_WEIGHT: f32 = 0.6;
/// Must stay below one rank-sum step (`RANK_SUM_WEIGHT / RANK_SUM_SPAN`) so
/// strength never drops as the combined rank rises.
const CONNECTOR_BONUS: f32 = 0.02;
const MAX_BOARD_CARDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Street {
    Preflop,
    Flop,
    Turn,
    River,
}

impl Street {
    /// Street implied by the number of board cards on the line.
    pub fn from_board_len(len: usize) -> Self {
        match len {
            0 => Street::Preflop,
            1..=3 => Street::Flop,
            4 => Street::Turn,
            _ => Street::River,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLayout {
    pub len: usize,
    pub time: Option<usize>,
    pub player: Option<usize>,
    pub street: Option<usize>,
    pub hole_cards: Option<usize>,
    pub board_cards: Option<usize>,
    pub strength: Option<usize>,
    pub betting: Option<usize>,
    pub history: Option<usize>,
    pub history_slots: usize,
    pub bankroll: Option<usize>,
    pub bounty: Option<usize>,
    pub game_over: Option<usize>,
}

impl FeatureLayout {
    /// First-generation layout, 200 wide.
    pub fn compact() -> Self {
        Self {
            len: 200,
            time: Some(0),
            player: Some(1),
            street: None,
            hole_cards: Some(2),
            board_cards: Some(54),
            strength: None,
            betting: None,
            history: Some(106),
            history_slots: 10,
            bankroll: Some(146),
            bounty: None,
            game_over: None,
        }
    }

    /// Default layout, 250 wide.
    pub fn extended() -> Self {
        Self {
            len: 250,
            time: Some(0),
            player: Some(1),
            street: Some(2),
            hole_cards: Some(6),
            board_cards: Some(58),
            strength: Some(110),
            betting: Some(114),
            history: Some(117),
            history_slots: 10,
            bankroll: Some(157),
            bounty: Some(158),
            game_over: Some(160),
        }
    }

    /// `(name, offset, width)` for every enabled block, in offset order.
    pub fn blocks(&self) -> Vec<(&'static str, usize, usize)> {
        let mut blocks: Vec<_> = [
            ("time", self.time, 1),
            ("player", self.player, 1),
            ("street", self.street, STREET_WIDTH),
            ("hole_cards", self.hole_cards, Card::COUNT),
            ("board_cards", self.board_cards, Card::COUNT),
            ("strength", self.strength, STRENGTH_WIDTH),
            ("betting", self.betting, BETTING_WIDTH),
            (
                "history",
                self.history,
                self.history_slots * HISTORY_SLOT_WIDTH,
            ),
            ("bankroll", self.bankroll, 1),
            ("bounty", self.bounty, BOUNTY_WIDTH),
            ("game_over", self.game_over, 1),
        ]
        .into_iter()
        .filter_map(|(name, offset, width)| offset.map(|offset| (name, offset, width)))
        .collect();
        blocks.sort_by_key(|(_, offset, _)| *offset);
        blocks
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut end_of_previous = 0;
        let mut previous = "start";
        for (name, offset, width) in self.blocks() {
            if offset < end_of_previous {
                return Err(ConfigError::Layout(format!(
                    "block '{name}' at {offset} overlaps '{previous}'"
                )));
            }
            end_of_previous = offset + width;
            previous = name;
            if end_of_previous > self.len {
                return Err(ConfigError::Layout(format!(
                    "block '{name}' ends at {end_of_previous}, past length {}",
                    self.len
                )));
            }
        }
        Ok(())
    }
}

/// Constants used to squash raw quantities into unit ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub game_clock: f64,
    pub starting_stack: u32,
    pub big_blind: u32,
    pub max_raises: u32,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            game_clock: 600.0,
            starting_stack: 400,
            big_blind: 2,
            max_raises: 4,
        }
    }
}

/// Pot and aggression figures recovered from one line's action history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BettingSummary {
    pub pot: u64,
    pub raises: u32,
    pub last_raise: u32,
}

impl BettingSummary {
    pub fn scan(history: &[ActionToken], big_blind: u32) -> Self {
        let mut summary = Self::default();
        for action in history {
            match action {
                ActionToken::Raise(amount) => {
                    summary.pot += u64::from(*amount);
                    summary.raises += 1;
                    summary.last_raise = *amount;
                }
                ActionToken::Call | ActionToken::Check => summary.pot += u64::from(big_blind),
                ActionToken::Fold => {}
            }
        }
        summary
    }
}

/// Rough preflop-style strength in `[0, 1]`. Not equity: higher ranks, pairs,
/// connectors and suitedness push it up, and hole ranks paired on the board
/// add a little.
pub fn hand_strength(hole: &[Card], board: &[Card]) -> f32 {
    let [first, second] = match hole {
        [a, b, ..] => [*a, *b],
        _ => return 0.0,
    };
    let (high, low) = (
        first.rank_value().max(second.rank_value()),
        first.rank_value().min(second.rank_value()),
    );

    let mut strength = (f32::from(high + low) - 4.0) / RANK_SUM_SPAN * RANK_SUM_WEIGHT;
    if high == low {
        strength += 0.25;
    } else if high - low == 1 {
        strength += CONNECTOR_BONUS;
    }
    if first.suit == second.suit {
        strength += 0.05;
    }
    let board_matches = [first, second]
        .iter()
        .filter(|card| board.iter().any(|b| b.rank == card.rank))
        .count();
    strength += board_matches as f32 * 0.04;
    strength.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservationEncoder {
    layout: FeatureLayout,
    norms: Normalization,
}

impl ObservationEncoder {
    pub fn new(layout: FeatureLayout, norms: Normalization) -> Result<Self, ConfigError> {
        layout.validate()?;
        Ok(Self { layout, norms })
    }

    pub fn len(&self) -> usize {
        self.layout.len
    }

    pub fn is_empty(&self) -> bool {
        self.layout.len == 0
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    pub fn normalization(&self) -> &Normalization {
        &self.norms
    }

    pub fn encode(&self, message: &StateMessage) -> Vec<f32> {
        let mut features = vec![0.0; self.layout.len];
        self.encode_into(message, &mut features);
        features
    }

    /// Writes into `out`, which must be exactly `len()` long; every slot is
    /// overwritten.
    pub fn encode_into(&self, message: &StateMessage, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.layout.len);
        out.fill(0.0);
        let layout = &self.layout;
        let stack = self.norms.starting_stack.max(1) as f32;

        if let Some(at) = layout.time {
            let seconds = message.time_remaining.unwrap_or(0.0);
            out[at] = unit((seconds / self.norms.game_clock) as f32);
        }
        if let Some(at) = layout.player {
            out[at] = unit(f32::from(message.player_index.unwrap_or(0)));
        }
        if let Some(at) = layout.street {
            out[at + Street::from_board_len(message.board_cards.len()).index()] = 1.0;
        }
        if let Some(at) = layout.hole_cards {
            set_cards(&mut out[at..at + Card::COUNT], &message.hole_cards, MAX_HOLE_CARDS);
        }
        if let Some(at) = layout.board_cards {
            set_cards(&mut out[at..at + Card::COUNT], &message.board_cards, MAX_BOARD_CARDS);
        }
        if let Some(at) = layout.strength {
            let hole = parse_cards(&message.hole_cards);
            let board = parse_cards(&message.board_cards);
            out[at] = hand_strength(&hole, &board);
            if let [a, b, ..] = hole.as_slice() {
                out[at + 1] = flag(a.rank == b.rank);
                out[at + 2] = flag(a.suit == b.suit);
                out[at + 3] = unit(f32::from(a.rank_value().max(b.rank_value()) - 2) / 12.0);
            }
        }
        if let Some(at) = layout.betting {
            let betting = BettingSummary::scan(&message.action_history, self.norms.big_blind);
            out[at] = unit(betting.pot as f32 / (2.0 * stack));
            out[at + 1] = unit(betting.raises as f32 / self.norms.max_raises.max(1) as f32);
            out[at + 2] = unit(betting.last_raise as f32 / stack);
        }
        if let Some(at) = layout.history {
            let slots = layout.history_slots;
            let skip = message.action_history.len().saturating_sub(slots);
            for (slot, action) in message.action_history.iter().skip(skip).enumerate() {
                let base = at + slot * HISTORY_SLOT_WIDTH;
                match action {
                    ActionToken::Fold => out[base] = 1.0,
                    ActionToken::Call => out[base + 1] = 1.0,
                    ActionToken::Check => out[base + 2] = 1.0,
                    ActionToken::Raise(amount) => out[base + 3] = unit(*amount as f32 / stack),
                }
            }
        }
        if let Some(at) = layout.bankroll {
            let delta = message.bankroll_delta.unwrap_or(0) as f32;
            out[at] = signed_unit(delta / stack);
        }
        if let Some(at) = layout.bounty {
            if let Some(hits) = message.bounty_hits.as_deref() {
                if let [own, opponent] = hits.as_bytes() {
                    out[at] = flag(*own == b'1');
                    out[at + 1] = flag(*opponent == b'1');
                }
            }
        }
        if let Some(at) = layout.game_over {
            out[at] = flag(message.game_over);
        }
    }
}

fn set_cards(block: &mut [f32], tokens: &[String], limit: usize) {
    for index in tokens.iter().take(limit).filter_map(|t| card_to_index(t)) {
        block[index] = 1.0;
    }
}

fn flag(value: bool) -> f32 {
    if value { 1.0 } else { 0.0 }
}

fn unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

fn signed_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) }
}
