//! Render seam
//!
//! The engine talks to the animation / audio / overlay layers through one
//! injected trait instead of a global event hub, so multiple spectating
//! sessions of the same match can coexist without cross-talk. Everything
//! here is an outbound notification; the sink must not call back into the
//! session.

use crate::outcome::MatchOutcome;
use crate::turn::{MoveKind, PerSide, Side, Turn};

pub trait RenderSink {
    /// A round-start turn's surge offer, resolved strictly before the same
    /// turn's combat exchange is rendered.
    fn surge_revealed(
        &mut self,
        round_number: u32,
        offered: &[u32],
        selections: &PerSide<Option<u32>>,
    ) {
        let _ = (round_number, offered, selections);
    }

    /// Render one turn. `effective_moves` already corrects for turn-start
    /// stun carry-over: a side whose previous turn ended stunned is
    /// presented as stunned here even if the record says otherwise.
    fn render_turn(&mut self, index: usize, turn: &Turn, effective_moves: PerSide<MoveKind>);

    /// `winner == None` with `double_ko` set means both sides went down on
    /// the same exchange; the loss presentation is simultaneous.
    fn round_ended(
        &mut self,
        round_number: u32,
        winner: Option<Side>,
        double_ko: bool,
        rounds_won: &PerSide<u32>,
    ) {
        let _ = (round_number, winner, double_ko, rounds_won);
    }

    fn match_ended(&mut self, outcome: &MatchOutcome) {
        let _ = outcome;
    }

    /// A fast-forward fold is about to consume turns up to `target_index`
    /// without rendering them. Optional UI feedback.
    fn catching_up(&mut self, target_index: usize) {
        let _ = target_index;
    }

    /// The payload carried no turns at all; render an explicit empty state
    /// rather than stalling.
    fn no_turn_data(&mut self) {}
}
