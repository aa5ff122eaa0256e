//! Turn normalization
//!
//! Match payloads have shipped in several incompatible historical shapes:
//! the same logical field appears under different names depending on the
//! schema revision that produced the record, and older records omit fields
//! newer ones carry. `RawTurn` is the union of every known shape (the alias
//! table lives in the serde attributes, so it is auditable in one place) and
//! [`Normalizer`] maps a raw record into a canonical [`Turn`].
//!
//! Normalization is total: it never fails on malformed input. Per field, in
//! priority order, it uses the alias-resolved raw value, then derives the
//! value from the previous canonical turn plus whatever delta fields the raw
//! record does carry, then falls back to a safe default. Each fallback
//! category logs a single `warn!` per session so a long catch-up over a
//! degenerate payload cannot spam the log.

use serde::Deserialize;
use tracing::warn;

use crate::turn::{FighterTurnState, MoveKind, PerSide, Side, Turn, TurnOutcome};

/// Raw per-fighter record. Every field optional, numerics as `f64` because
/// the upstream service emits JavaScript numbers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawFighterState {
    #[serde(rename = "move", alias = "action", alias = "moveType")]
    pub mv: Option<String>,
    #[serde(alias = "hp", alias = "remainingHp", alias = "healthAfter")]
    pub hp_after: Option<f64>,
    #[serde(alias = "energy", alias = "remainingEnergy")]
    pub energy_after: Option<f64>,
    #[serde(alias = "guard", alias = "guardMeter", alias = "guardMeterAfter")]
    pub guard_after: Option<f64>,
    #[serde(alias = "damage", alias = "dmg")]
    pub damage_taken: Option<f64>,
    #[serde(alias = "regen", alias = "healingApplied")]
    pub hp_regen: Option<f64>,
    #[serde(alias = "lifestealAmount")]
    pub lifesteal: Option<f64>,
    #[serde(alias = "energyDrain")]
    pub energy_drained: Option<f64>,
    #[serde(alias = "stunned")]
    pub is_stunned: Option<bool>,
    #[serde(alias = "result")]
    pub outcome: Option<String>,
    #[serde(alias = "surgeCard", alias = "powerSurge", alias = "surgeCardId")]
    pub surge_selection: Option<u32>,
}

/// Raw turn record as delivered by the match-computation service, covering
/// every historical schema revision at once.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawTurn {
    #[serde(alias = "turn", alias = "turnNo")]
    pub turn_number: Option<u32>,
    #[serde(alias = "round", alias = "roundNo")]
    pub round_number: Option<u32>,
    #[serde(alias = "player1", alias = "fighter1", alias = "left")]
    pub p1: Option<RawFighterState>,
    #[serde(alias = "player2", alias = "fighter2", alias = "right")]
    pub p2: Option<RawFighterState>,
    #[serde(alias = "roundStart")]
    pub is_round_start: Option<bool>,
    #[serde(alias = "roundEnd", alias = "roundOver")]
    pub is_round_end: Option<bool>,
    #[serde(alias = "matchEnd", alias = "matchOver", alias = "gameOver")]
    pub is_match_end: Option<bool>,
    #[serde(alias = "winner", alias = "roundWinnerSide")]
    pub round_winner: Option<String>,
    #[serde(alias = "powerSurgeCards", alias = "cardOptions", alias = "surgeOptions")]
    pub surge_card_ids: Option<Vec<u32>>,
    #[serde(alias = "commentary", alias = "text", alias = "description")]
    pub narrative: Option<String>,
}

/// Fallback categories, each warned about at most once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FallbackKind {
    MissingSide,
    UnknownMove,
    DerivedNumeric,
    DefaultedDelta,
    UnparsableWinner,
    DerivedOrdering,
}

#[derive(Debug, Default)]
struct WarnedFlags {
    missing_side: bool,
    unknown_move: bool,
    derived_numeric: bool,
    defaulted_delta: bool,
    unparsable_winner: bool,
    derived_ordering: bool,
}

/// Stateful normalizer for one timeline construction. The only state is the
/// once-per-session diagnostic bookkeeping.
#[derive(Debug, Default)]
pub struct Normalizer {
    warned: WarnedFlags,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a raw record into a canonical turn. `prev` is the previous
    /// canonical turn of the timeline, `index` the 0-based position of the
    /// record being normalized.
    pub fn normalize(&mut self, raw: &RawTurn, prev: Option<&Turn>, index: usize) -> Turn {
        let (turn_number, round_number) = self.resolve_ordering(raw, prev);

        let is_round_end = raw.is_round_end.unwrap_or(false);
        let is_match_end = raw.is_match_end.unwrap_or(false);
        let is_round_start = raw.is_round_start.unwrap_or_else(|| {
            // Derivable even when the record omits it entirely.
            index == 0 || turn_number == 1 || prev.map(|p| p.is_round_end).unwrap_or(false)
        });

        let round_winner = raw.round_winner.as_deref().and_then(|label| {
            let side = Side::from_label(label);
            if side.is_none() {
                // "draw" / "none" are legitimate spellings of a double-KO.
                let drawish = matches!(
                    label.trim().to_ascii_lowercase().as_str(),
                    "" | "draw" | "none" | "tie"
                );
                if !drawish {
                    self.note(
                        FallbackKind::UnparsableWinner,
                        "unrecognized round winner label; treating round as a draw",
                    );
                }
            }
            side
        });

        let p1 = self.resolve_side(raw.p1.as_ref(), prev.map(|p| &p.sides.p1));
        let p2 = self.resolve_side(raw.p2.as_ref(), prev.map(|p| &p.sides.p2));
        let surge_selection = PerSide::new(
            raw.p1.as_ref().and_then(|s| s.surge_selection),
            raw.p2.as_ref().and_then(|s| s.surge_selection),
        );

        Turn {
            turn_number,
            round_number,
            sides: PerSide::new(p1, p2),
            is_round_start,
            is_round_end,
            is_match_end,
            round_winner,
            surge_card_ids: raw.surge_card_ids.clone().unwrap_or_default(),
            surge_selection,
            narrative: raw.narrative.clone(),
        }
    }

    fn resolve_ordering(&mut self, raw: &RawTurn, prev: Option<&Turn>) -> (u32, u32) {
        let derived = match prev {
            None => (1, 1),
            Some(p) if p.is_round_end && !p.is_match_end => (1, p.round_number + 1),
            Some(p) => (p.turn_number + 1, p.round_number),
        };
        if raw.turn_number.is_none() || raw.round_number.is_none() {
            self.note(
                FallbackKind::DerivedOrdering,
                "turn/round number missing; deriving from the previous turn",
            );
        }
        (
            raw.turn_number.unwrap_or(derived.0).max(1),
            raw.round_number.unwrap_or(derived.1).max(1),
        )
    }

    fn resolve_side(
        &mut self,
        raw: Option<&RawFighterState>,
        prev: Option<&FighterTurnState>,
    ) -> FighterTurnState {
        let raw = match raw {
            Some(r) => r,
            None => {
                self.note(
                    FallbackKind::MissingSide,
                    "fighter record missing; carrying previous state forward",
                );
                // Nothing happened to this side as far as we can tell.
                let mut state = prev.cloned().unwrap_or_default();
                state.damage_taken = 0;
                state.hp_regen = 0;
                state.lifesteal = 0;
                state.energy_drained = 0;
                state.outcome = None;
                return state;
            }
        };

        let is_stunned = raw.is_stunned.unwrap_or(false);
        let mv = match raw.mv.as_deref() {
            Some(label) => MoveKind::from_label(label).unwrap_or_else(|| {
                self.note(
                    FallbackKind::UnknownMove,
                    "unknown move label; defaulting to block",
                );
                MoveKind::Block
            }),
            // A stunned side that recorded no move was stunned, not blocking.
            None if is_stunned => MoveKind::Stunned,
            None => {
                self.note(
                    FallbackKind::UnknownMove,
                    "move missing from record; defaulting to block",
                );
                MoveKind::Block
            }
        };

        let prev_hp = prev.map(|p| p.hp_after);
        let hp_regen = self.resolve_delta(raw.hp_regen);
        let damage_taken = match raw.damage_taken {
            Some(v) => v.round() as i32,
            // damageTaken = previousHp - currentHp + healingApplied
            None => match (prev_hp, raw.hp_after) {
                (Some(before), Some(after)) => {
                    self.note(
                        FallbackKind::DerivedNumeric,
                        "numeric field missing; deriving from previous turn state",
                    );
                    (before - after.round() as i32 + hp_regen).max(0)
                }
                _ => self.resolve_delta(None),
            },
        };
        let hp_after = match raw.hp_after {
            Some(v) => v.round() as i32,
            None => match prev_hp {
                Some(before) => {
                    self.note(
                        FallbackKind::DerivedNumeric,
                        "numeric field missing; deriving from previous turn state",
                    );
                    (before - damage_taken + hp_regen).max(0)
                }
                None => 0,
            },
        };

        FighterTurnState {
            mv,
            hp_after,
            energy_after: self.resolve_after(raw.energy_after, prev.map(|p| p.energy_after)),
            guard_after: self.resolve_after(raw.guard_after, prev.map(|p| p.guard_after)),
            damage_taken,
            hp_regen,
            lifesteal: self.resolve_delta(raw.lifesteal),
            energy_drained: self.resolve_delta(raw.energy_drained),
            is_stunned,
            outcome: raw.outcome.as_deref().and_then(TurnOutcome::from_label),
        }
    }

    /// After-state fields carry forward when missing; deltas default to 0.
    fn resolve_after(&mut self, raw: Option<f64>, prev: Option<i32>) -> i32 {
        match raw {
            Some(v) => v.round() as i32,
            None => match prev {
                Some(before) => {
                    self.note(
                        FallbackKind::DerivedNumeric,
                        "numeric field missing; carrying previous after-state forward",
                    );
                    before
                }
                None => 0,
            },
        }
    }

    fn resolve_delta(&mut self, raw: Option<f64>) -> i32 {
        match raw {
            Some(v) => v.round() as i32,
            None => {
                self.note(
                    FallbackKind::DefaultedDelta,
                    "delta field missing; defaulting to 0",
                );
                0
            }
        }
    }

    fn note(&mut self, kind: FallbackKind, message: &str) {
        let flag = match kind {
            FallbackKind::MissingSide => &mut self.warned.missing_side,
            FallbackKind::UnknownMove => &mut self.warned.unknown_move,
            FallbackKind::DerivedNumeric => &mut self.warned.derived_numeric,
            FallbackKind::DefaultedDelta => &mut self.warned.defaulted_delta,
            FallbackKind::UnparsableWinner => &mut self.warned.unparsable_winner,
            FallbackKind::DerivedOrdering => &mut self.warned.derived_ordering,
        };
        if !*flag {
            *flag = true;
            warn!("turn normalization fallback: {}", message);
        }
    }

    /// Whether any fallback rule fired while this normalizer was in use.
    pub fn degraded(&self) -> bool {
        self.warned.missing_side
            || self.warned.unknown_move
            || self.warned.derived_numeric
            || self.warned.defaulted_delta
            || self.warned.unparsable_winner
            || self.warned.derived_ordering
    }
}
