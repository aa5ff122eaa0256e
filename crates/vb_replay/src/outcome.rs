//! Match outcome resolution
//!
//! Not every payload carries a clean `is_match_end` turn, and historical
//! ones occasionally disagree with their own round tallies. The final
//! outcome is therefore resolved by a deterministic fallback chain:
//! explicit recorded match winner, else higher round-win count, else higher
//! HP on the final turn, else a draw.

use serde::Serialize;

use crate::timeline::MatchTimeline;
use crate::turn::{PerSide, Side};

/// Which rule of the fallback chain decided the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecidedBy {
    RecordedWinner,
    RoundCount,
    FinalHp,
    Draw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    pub winner: Option<Side>,
    pub rounds_won: PerSide<u32>,
    pub decided_by: DecidedBy,
}

pub fn resolve_outcome(timeline: &MatchTimeline, rounds_won: &PerSide<u32>) -> MatchOutcome {
    let rounds_won = *rounds_won;

    if let Some(winner) = timeline.recorded_winner() {
        return MatchOutcome {
            winner: Some(winner),
            rounds_won,
            decided_by: DecidedBy::RecordedWinner,
        };
    }

    if rounds_won.p1 != rounds_won.p2 {
        let winner = if rounds_won.p1 > rounds_won.p2 {
            Side::P1
        } else {
            Side::P2
        };
        return MatchOutcome {
            winner: Some(winner),
            rounds_won,
            decided_by: DecidedBy::RoundCount,
        };
    }

    if let Some(last) = timeline.last_turn() {
        let (hp1, hp2) = (last.sides.p1.hp_after, last.sides.p2.hp_after);
        if hp1 != hp2 {
            let winner = if hp1 > hp2 { Side::P1 } else { Side::P2 };
            return MatchOutcome {
                winner: Some(winner),
                rounds_won,
                decided_by: DecidedBy::FinalHp,
            };
        }
    }

    MatchOutcome {
        winner: None,
        rounds_won,
        decided_by: DecidedBy::Draw,
    }
}
