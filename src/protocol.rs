//! Line protocol spoken by the engine.
//!
//! Every server line is a space-separated list of clauses. A clause is either a
//! single-letter tag followed by its payload (`T599.2`, `H7s,8s`, `D-50`), the
//! terminal marker `Q`, or a bare action token (`F`, `C`, `K`, `R40`) that
//! gets appended to the hand's action history. Client lines carry exactly one
//! action token.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionToken {
    Fold,
    Call,
    Check,
    Raise(u32),
}

impl ActionToken {
    pub fn is_raise(&self) -> bool {
        matches!(self, ActionToken::Raise(_))
    }
}

impl Display for ActionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionToken::Fold => f.write_str("F"),
            ActionToken::Call => f.write_str("C"),
            ActionToken::Check => f.write_str("K"),
            ActionToken::Raise(amount) => write!(f, "R{amount}"),
        }
    }
}

impl FromStr for ActionToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "F" => Ok(ActionToken::Fold),
            "C" => Ok(ActionToken::Call),
            "K" => Ok(ActionToken::Check),
            _ => s
                .strip_prefix('R')
                .and_then(|amount| amount.parse::<u32>().ok())
                .map(ActionToken::Raise)
                .ok_or_else(|| format!("Invalid action token '{s}'")),
        }
    }
}

/// Everything one engine line said. Fields the line did not mention keep
/// their neutral default.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    pub time_remaining: Option<f64>,
    pub player_index: Option<u8>,
    pub hole_cards: Vec<String>,
    pub board_cards: Vec<String>,
    pub opponent_hand: Vec<String>,
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub action_history: Vec<ActionToken>,
    pub bankroll_delta: Option<i64>,
    pub bounty_hits: Option<String>,
    pub game_over: bool,
}

impl StateMessage {
    pub fn last_action(&self) -> Option<&ActionToken> {
        self.action_history.last()
    }

    pub fn facing_raise(&self) -> bool {
        self.last_action().is_some_and(ActionToken::is_raise)
    }
}

/// Parses one line. Returns `None` only when the line is blank; anything
/// else yields a best-effort message with unreadable clauses skipped.
pub fn parse_line(line: &str) -> Option<StateMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut message = StateMessage::default();
    for clause in line.split_whitespace() {
        if clause == "Q" {
            message.game_over = true;
            continue;
        }
        if let Ok(action) = clause.parse::<ActionToken>() {
            message.action_history.push(action);
            continue;
        }
        if !apply_clause(&mut message, clause) {
            trace!(clause, "skipping unreadable clause");
        }
    }
    Some(message)
}

fn apply_clause(message: &mut StateMessage, clause: &str) -> bool {
    let mut chars = clause.chars();
    let Some(tag) = chars.next() else {
        return false;
    };
    let payload = chars.as_str();

    match tag {
        'T' => match payload.parse::<f64>() {
            Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => {
                message.time_remaining = Some(seconds)
            }
            _ => return false,
        },
        'P' => match payload.parse::<u8>() {
            Ok(index @ 0..=1) => message.player_index = Some(index),
            _ => return false,
        },
        'H' => message.hole_cards = split_cards(payload),
        'B' => message.board_cards = split_cards(payload),
        'O' => message.opponent_hand = split_cards(payload),
        'D' => match payload.parse::<i64>() {
            Ok(delta) => message.bankroll_delta = Some(delta),
            Err(_) => return false,
        },
        'Y' => message.bounty_hits = Some(payload.to_string()),
        _ => return false,
    }
    true
}

fn split_cards(payload: &str) -> Vec<String> {
    payload
        .split(',')
        .filter(|card| !card.is_empty())
        .map(str::to_string)
        .collect()
}

/// Frames an action for the wire.
pub fn encode_action(action: &ActionToken) -> String {
    format!("{action}\n")
}
