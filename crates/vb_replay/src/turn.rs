//! Canonical turn model
//!
//! One `Turn` is a fully resolved exchange between both fighters: the moves
//! thrown, the post-state of each side (HP / energy / guard) and the
//! round / match lifecycle flags. Turns are totally ordered by
//! `(round_number, turn_number)` and `turn_number` restarts at 1 every round.

use serde::{Deserialize, Serialize};

/// One of the two fighters of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    P1,
    P2,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::P1, Side::P2];

    pub fn opponent(self) -> Side {
        match self {
            Side::P1 => Side::P2,
            Side::P2 => Side::P1,
        }
    }

    /// Parse the side labels that have appeared across payload revisions.
    pub fn from_label(label: &str) -> Option<Side> {
        match label.trim().to_ascii_lowercase().as_str() {
            "p1" | "player1" | "player_1" | "one" | "1" | "left" | "a" => Some(Side::P1),
            "p2" | "player2" | "player_2" | "two" | "2" | "right" | "b" => Some(Side::P2),
            _ => None,
        }
    }
}

/// Pair of values, one per fighter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerSide<T> {
    pub p1: T,
    pub p2: T,
}

impl<T> PerSide<T> {
    pub fn new(p1: T, p2: T) -> Self {
        Self { p1, p2 }
    }

    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::P1 => &self.p1,
            Side::P2 => &self.p2,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::P1 => &mut self.p1,
            Side::P2 => &mut self.p2,
        }
    }
}

/// Combat move, mirroring the on-chain `MoveType` plus the stun state the
/// client derives for presentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveKind {
    Punch,
    Kick,
    #[default]
    Block,
    Special,
    Stunned,
}

impl MoveKind {
    pub fn from_label(label: &str) -> Option<MoveKind> {
        match label.trim().to_ascii_lowercase().as_str() {
            "punch" => Some(MoveKind::Punch),
            "kick" => Some(MoveKind::Kick),
            "block" | "guard" => Some(MoveKind::Block),
            "special" | "super" => Some(MoveKind::Special),
            "stunned" | "stun" => Some(MoveKind::Stunned),
            _ => None,
        }
    }
}

/// How a move resolved for the side that threw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnOutcome {
    Hit,
    Missed,
    Stunned,
}

impl TurnOutcome {
    pub fn from_label(label: &str) -> Option<TurnOutcome> {
        match label.trim().to_ascii_lowercase().as_str() {
            "hit" => Some(TurnOutcome::Hit),
            "missed" | "miss" => Some(TurnOutcome::Missed),
            "stunned" | "stun" => Some(TurnOutcome::Stunned),
            _ => None,
        }
    }
}

/// Post-turn state of one fighter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FighterTurnState {
    #[serde(rename = "move")]
    pub mv: MoveKind,
    pub hp_after: i32,
    pub energy_after: i32,
    pub guard_after: i32,
    pub damage_taken: i32,
    pub hp_regen: i32,
    pub lifesteal: i32,
    pub energy_drained: i32,
    pub is_stunned: bool,
    pub outcome: Option<TurnOutcome>,
}

/// One resolved exchange of the match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based within the round.
    pub turn_number: u32,
    /// 1-based within the match.
    pub round_number: u32,
    pub sides: PerSide<FighterTurnState>,
    pub is_round_start: bool,
    pub is_round_end: bool,
    pub is_match_end: bool,
    /// `None` with `is_round_end` set means a double-KO draw; both sides'
    /// round-loss presentation is simultaneous, never sequential.
    pub round_winner: Option<Side>,
    /// Power surge cards offered at a round start (numeric card codes,
    /// matching `submit_power_surge`). Empty outside round starts.
    pub surge_card_ids: Vec<u32>,
    pub surge_selection: PerSide<Option<u32>>,
    pub narrative: Option<String>,
}
