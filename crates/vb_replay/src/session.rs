//! Match session: resync control and playback scheduling
//!
//! A [`MatchSession`] owns the only mutable state of the engine — the
//! [`PlaybackPosition`] — and reconstructs where in the match the client
//! should be at any wall-clock instant. The hard cases it exists for:
//! joining after the match started, the host suspending timers while the
//! tab is hidden, authoritative pushes that disagree with the local clock,
//! and payloads still inside the pre-match lead-in window.
//!
//! Scheduling is cooperative and host-driven: the session keeps at most one
//! pending one-shot deadline and the host pumps [`MatchSession::tick`] from
//! its frame loop. Scheduling a new deadline always replaces the previous
//! one, so rescheduling is idempotent by construction. Every entry point
//! checks the destroyed flag first, so callbacks surviving a teardown race
//! in the host environment are no-ops.
//!
//! Catch-up folds run synchronously and are not interruptible; folded
//! bookkeeping is bit-identical to what sequential animated playback would
//! have produced.

use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::{ClockReconciler, WallClock};
use crate::outcome::resolve_outcome;
use crate::sink::RenderSink;
use crate::timeline::{LeadInStatus, MatchPayload, MatchTimeline};
use crate::turn::{MoveKind, PerSide, Turn};

/// Lifecycle of a session. `Playing` covers the transient catching-up
/// sub-state; catch-up folds are synchronous, so it is never observable
/// from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    NotStarted,
    LeadIn,
    Playing,
    Finished,
}

/// Mutable playback cursor and the round/match bookkeeping folded over
/// consumed turns. Owned exclusively by one session; `current_turn_index`
/// is monotonically non-decreasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackPosition {
    pub current_turn_index: usize,
    pub is_playing: bool,
    pub rounds_won: PerSide<u32>,
    pub current_round_number: u32,
    pub active_surge: PerSide<Option<u32>>,
}

impl Default for PlaybackPosition {
    fn default() -> Self {
        Self {
            current_turn_index: 0,
            is_playing: false,
            rounds_won: PerSide::new(0, 0),
            current_round_number: 1,
            active_surge: PerSide::new(None, None),
        }
    }
}

impl PlaybackPosition {
    /// Fold one consumed turn into the bookkeeping. Identical for silent
    /// catch-up and animated playback; that equivalence is the central
    /// correctness property of the engine.
    pub fn apply(&mut self, turn: &Turn) {
        if turn.is_round_start {
            self.active_surge = turn.surge_selection;
        }
        if turn.is_round_end {
            if let Some(winner) = turn.round_winner {
                *self.rounds_won.get_mut(winner) += 1;
            }
            self.active_surge = PerSide::new(None, None);
            if !turn.is_match_end {
                self.current_round_number += 1;
            }
        }
    }

    /// Fold turns `[from, to)` of the timeline, bounds-clamped.
    pub fn fold_over(&mut self, timeline: &MatchTimeline, from: usize, to: usize) {
        for index in from..to.min(timeline.len()) {
            self.apply(timeline.turn_at(index));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerPurpose {
    LeadIn,
    NextTurn,
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    purpose: TimerPurpose,
    fire_at_local_ms: i64,
}

/// Push-style resync notification from the server. Ignored unless
/// `match_id` names the active session's match.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncPush {
    #[serde(alias = "sessionId")]
    pub match_id: u64,
    #[serde(alias = "serverNow")]
    pub server_time: i64,
    #[serde(default, alias = "serverTurnIndex")]
    pub current_turn_index: Option<usize>,
    #[serde(default, alias = "bettingStatus")]
    pub lead_in_status: Option<LeadInStatus>,
}

/// Session-creation inputs that are not part of the immutable timeline.
#[derive(Debug, Clone, Default)]
pub struct SessionStart {
    pub start_index: usize,
    pub server_time: Option<i64>,
    pub lead_in_status: Option<LeadInStatus>,
}

impl SessionStart {
    pub fn from_payload(payload: &MatchPayload) -> Self {
        Self {
            start_index: payload.start_turn_index.unwrap_or(0),
            server_time: payload.server_time,
            lead_in_status: payload.lead_in_status,
        }
    }
}

/// One client's view of one match, kept in lockstep with the authoritative
/// timeline.
pub struct MatchSession<C, R> {
    timeline: Arc<MatchTimeline>,
    clock: ClockReconciler<C>,
    sink: R,
    position: PlaybackPosition,
    phase: SessionPhase,
    timer: Option<PendingTimer>,
    destroyed: bool,
}

impl<C: WallClock, R: RenderSink> MatchSession<C, R> {
    pub fn new(timeline: Arc<MatchTimeline>, clock: C, sink: R) -> Self {
        Self {
            timeline,
            clock: ClockReconciler::new(clock),
            sink,
            position: PlaybackPosition::default(),
            phase: SessionPhase::NotStarted,
            timer: None,
            destroyed: false,
        }
    }

    // ======================================================================
    // External triggers
    // ======================================================================

    /// Initial entry: anchor the clock, materialize late-joiner state, and
    /// either begin the lead-in wait or start playback at the expected
    /// index.
    pub fn begin(&mut self, start: SessionStart) {
        if self.destroyed || self.phase != SessionPhase::NotStarted {
            return;
        }
        if let Some(server_time) = start.server_time {
            self.clock.update_offset(server_time);
        }

        if self.timeline.is_empty() || self.timeline.turn_duration_ms() <= 0 {
            if self.timeline.is_empty() {
                self.sink.no_turn_data();
            }
            self.finish();
            return;
        }

        // Fold [0, i0) so the position is consistent with having always
        // been there. No render calls for any folded turn.
        let start_index = start.start_index.min(self.timeline.len());
        self.position
            .fold_over(&Arc::clone(&self.timeline), 0, start_index);
        self.position.current_turn_index = start_index;
        info!(
            match_id = self.timeline.match_id(),
            start_index, "session joined"
        );

        if let Some(status) = start.lead_in_status {
            if status.is_open {
                self.phase = SessionPhase::LeadIn;
                self.schedule(TimerPurpose::LeadIn, secs_to_ms(status.seconds_remaining));
                return;
            }
        }
        self.resync_from_wall_clock();
    }

    /// The client became visible again; local timers may have been
    /// suspended for any amount of time. Recompute from the wall clock.
    pub fn on_visible(&mut self) {
        if self.destroyed || self.phase == SessionPhase::NotStarted {
            return;
        }
        self.resync_from_wall_clock();
    }

    /// Authoritative push. Refreshes the clock offset and prefers the
    /// pushed turn index over any wall-clock estimate.
    pub fn on_resync_push(&mut self, push: &ResyncPush) {
        if self.destroyed || push.match_id != self.timeline.match_id() {
            return;
        }
        if self.phase == SessionPhase::Finished || self.phase == SessionPhase::NotStarted {
            return;
        }
        self.clock.update_offset(push.server_time);

        if let Some(status) = push.lead_in_status {
            if status.is_open && self.phase != SessionPhase::Playing {
                // Trust the server's remaining window over the local
                // schedule; replacing the deadline keeps this idempotent.
                self.phase = SessionPhase::LeadIn;
                self.schedule(TimerPurpose::LeadIn, secs_to_ms(status.seconds_remaining));
                return;
            }
        }
        match push.current_turn_index {
            Some(index) => self.apply_expected_index(index),
            None => self.resync_from_wall_clock(),
        }
    }

    /// Host frame pump. Fires the pending deadline when it is due.
    pub fn tick(&mut self, local_now_ms: i64) {
        if self.destroyed {
            return;
        }
        let timer = match self.timer {
            Some(t) if local_now_ms >= t.fire_at_local_ms => t,
            _ => return,
        };
        self.timer = None;
        match timer.purpose {
            TimerPurpose::LeadIn => self.resync_from_wall_clock(),
            TimerPurpose::NextTurn => self.advance_one(),
        }
    }

    /// Cancel every outstanding timer and make all later callbacks no-ops.
    pub fn destroy(&mut self) {
        self.destroyed = true;
        self.timer = None;
        self.position.is_playing = false;
    }

    // ======================================================================
    // Accessors
    // ======================================================================

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn position(&self) -> &PlaybackPosition {
        &self.position
    }

    pub fn timeline(&self) -> &Arc<MatchTimeline> {
        &self.timeline
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut R {
        &mut self.sink
    }

    pub fn is_finished(&self) -> bool {
        self.phase == SessionPhase::Finished
    }

    /// Local-clock deadline of the single pending timer, if any. Hosts use
    /// this to decide when the next `tick` matters.
    pub fn pending_deadline(&self) -> Option<i64> {
        self.timer.map(|t| t.fire_at_local_ms)
    }

    // ======================================================================
    // Resync controller
    // ======================================================================

    /// Core formula: convert authoritative elapsed time since gameplay
    /// start into the turn index the client should be at.
    fn resync_from_wall_clock(&mut self) {
        if self.phase == SessionPhase::Finished {
            return;
        }
        let auth_now = self.clock.now();
        let start_at = self.timeline.gameplay_start_at();

        if auth_now < start_at && self.phase != SessionPhase::Playing {
            // Still in the lead-in window (negative elapsed time lands
            // here too). Reschedule the one-shot transition, replacing any
            // previous schedule.
            self.phase = SessionPhase::LeadIn;
            self.schedule(TimerPurpose::LeadIn, start_at - auth_now);
            return;
        }

        let elapsed = (auth_now - start_at).max(0);
        let expected = (elapsed / self.timeline.turn_duration_ms()) as usize;
        self.apply_expected_index(expected);
    }

    /// Act on an expected index (wall-clock derived or push-provided,
    /// unclamped). An index at or behind the current position never
    /// rewinds: clock jitter and duplicate pushes are no-ops.
    fn apply_expected_index(&mut self, expected: usize) {
        if self.destroyed || self.phase == SessionPhase::Finished {
            return;
        }
        let total = self.timeline.len();
        if total == 0 {
            self.finish();
            return;
        }

        let entering_play = self.phase != SessionPhase::Playing;
        if entering_play {
            self.phase = SessionPhase::Playing;
            self.timer = None;
        }
        let current = self.position.current_turn_index;

        if expected >= total {
            // The wall clock (or push) says the match already ended: fold
            // everything that remains and emit the outcome, no rendering.
            let timeline = Arc::clone(&self.timeline);
            self.pause();
            if total.saturating_sub(current) > 1 {
                self.sink.catching_up(total - 1);
            }
            self.position.fold_over(&timeline, current, total);
            self.position.current_turn_index = current.max(total - 1);
            self.finish();
            return;
        }

        if expected > current {
            let was_playing = self.position.is_playing || entering_play;
            self.pause();
            self.sink.catching_up(expected);
            debug!(from = current, to = expected, "fast-forward fold");
            let timeline = Arc::clone(&self.timeline);
            self.position.fold_over(&timeline, current, expected);
            self.position.current_turn_index = expected;
            self.refresh_active_surge();
            if was_playing {
                self.resume_after_catch_up();
            }
        } else if !self.position.is_playing {
            self.start();
        }
    }

    /// Re-derive the active surge selections after a fold, from the nearest
    /// round-start turn at or before the new position.
    fn refresh_active_surge(&mut self) {
        let round = self.position.current_round_number;
        let index = self.position.current_turn_index;
        if let Some(start) = self.timeline.find_round_start(round, index) {
            self.position.active_surge = self.timeline.turn_at(start).surge_selection;
        }
    }

    // ======================================================================
    // Playback scheduler
    // ======================================================================

    /// Begin pacing from the current index. No-op if already playing;
    /// starting past the end finishes immediately.
    pub fn start(&mut self) {
        if self.destroyed || self.position.is_playing || self.phase == SessionPhase::Finished {
            return;
        }
        if self.position.current_turn_index >= self.timeline.len() {
            self.finish();
            return;
        }
        self.phase = SessionPhase::Playing;
        self.position.is_playing = true;
        self.advance_one();
    }

    /// Cancel any pending scheduled advance. Called before every catch-up
    /// fold so the scheduler never races state being rewritten.
    pub fn pause(&mut self) {
        self.timer = None;
        self.position.is_playing = false;
    }

    /// Restart pacing from the current index without re-rendering anything
    /// that was folded.
    fn resume_after_catch_up(&mut self) {
        self.start();
    }

    /// Render exactly one turn, fold it, then either schedule the next
    /// advance or finish.
    fn advance_one(&mut self) {
        if self.destroyed || self.phase != SessionPhase::Playing {
            return;
        }
        self.position.is_playing = true;
        let index = self.position.current_turn_index;
        let timeline = Arc::clone(&self.timeline);
        let turn = match timeline.get(index) {
            Some(turn) => turn,
            None => {
                self.finish();
                return;
            }
        };

        // The surge offer resolves before the same turn's combat exchange;
        // the two are never reordered or interleaved across turns.
        if turn.is_round_start && !turn.surge_card_ids.is_empty() {
            self.sink
                .surge_revealed(turn.round_number, &turn.surge_card_ids, &turn.surge_selection);
        }

        let effective = self.effective_moves(index, turn);
        self.sink.render_turn(index, turn, effective);
        self.position.apply(turn);

        if turn.is_round_end {
            self.sink.round_ended(
                turn.round_number,
                turn.round_winner,
                turn.round_winner.is_none(),
                &self.position.rounds_won,
            );
        }

        if turn.is_match_end || index + 1 >= timeline.len() {
            self.finish();
            return;
        }
        self.position.current_turn_index = index + 1;
        self.schedule(TimerPurpose::NextTurn, self.timeline.turn_duration_ms());
    }

    /// Stun carry-over correction for presentation: a side whose previous
    /// turn ended stunned is shown as stunned this turn, whatever the
    /// record says. Round starts reset the carry-over.
    fn effective_moves(&self, index: usize, turn: &Turn) -> PerSide<MoveKind> {
        let prev = if index == 0 || turn.is_round_start {
            None
        } else {
            self.timeline.get(index - 1)
        };
        let correct = |recorded: MoveKind, was_stunned: bool| {
            if was_stunned {
                MoveKind::Stunned
            } else {
                recorded
            }
        };
        PerSide::new(
            correct(
                turn.sides.p1.mv,
                prev.map(|p| p.sides.p1.is_stunned).unwrap_or(false),
            ),
            correct(
                turn.sides.p2.mv,
                prev.map(|p| p.sides.p2.is_stunned).unwrap_or(false),
            ),
        )
    }

    fn finish(&mut self) {
        self.timer = None;
        self.position.is_playing = false;
        if self.phase == SessionPhase::Finished {
            return;
        }
        self.phase = SessionPhase::Finished;
        let outcome = resolve_outcome(&self.timeline, &self.position.rounds_won);
        info!(
            match_id = self.timeline.match_id(),
            winner = ?outcome.winner,
            "match finished"
        );
        self.sink.match_ended(&outcome);
    }

    /// Arm the single one-shot timer, replacing whatever was pending.
    fn schedule(&mut self, purpose: TimerPurpose, delay_ms: i64) {
        self.timer = Some(PendingTimer {
            purpose,
            fire_at_local_ms: self.clock.local_now_ms() + delay_ms.max(0),
        });
    }
}

fn secs_to_ms(seconds: f64) -> i64 {
    (seconds.max(0.0) * 1000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::recording::{RecordingSink, SinkEvent};
    use crate::turn::Side;
    use proptest::prelude::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct ManualClock(Rc<Cell<i64>>);

    impl ManualClock {
        fn at(ms: i64) -> Self {
            let clock = Self::default();
            clock.set(ms);
            clock
        }

        fn set(&self, ms: i64) {
            self.0.set(ms);
        }
    }

    impl WallClock for ManualClock {
        fn local_now_ms(&self) -> i64 {
            self.0.get()
        }
    }

    /// Canonical timeline out of `(turns_in_round, winner)` descriptors.
    /// Every round start offers surge cards [1, 2, 3] with selections
    /// (1, 2); the last round's end is the match end.
    fn make_timeline(
        rounds: &[(u32, Option<Side>)],
        turn_duration_ms: i64,
        match_created_at: i64,
        lead_in_window_ms: i64,
    ) -> MatchTimeline {
        let mut turns = Vec::new();
        for (round_idx, &(len, winner)) in rounds.iter().enumerate() {
            for turn_idx in 0..len {
                let mut turn = Turn::default();
                turn.turn_number = turn_idx + 1;
                turn.round_number = round_idx as u32 + 1;
                turn.is_round_start = turn_idx == 0;
                turn.is_round_end = turn_idx == len - 1;
                turn.is_match_end = turn.is_round_end && round_idx == rounds.len() - 1;
                turn.round_winner = if turn.is_round_end { winner } else { None };
                if turn.is_round_start {
                    turn.surge_card_ids = vec![1, 2, 3];
                    turn.surge_selection = PerSide::new(Some(1), Some(2));
                }
                turn.sides.p1.mv = MoveKind::Punch;
                turn.sides.p2.mv = MoveKind::Block;
                turn.sides.p1.hp_after = 100;
                turn.sides.p2.hp_after = 100;
                turns.push(turn);
            }
        }
        MatchTimeline::from_turns(
            1,
            turns,
            turn_duration_ms,
            match_created_at,
            lead_in_window_ms,
            None,
        )
    }

    fn session_with(
        timeline: MatchTimeline,
        clock: &ManualClock,
    ) -> MatchSession<ManualClock, RecordingSink> {
        MatchSession::new(Arc::new(timeline), clock.clone(), RecordingSink::default())
    }

    fn start_at(index: usize, server_time: i64) -> SessionStart {
        SessionStart {
            start_index: index,
            server_time: Some(server_time),
            lead_in_status: None,
        }
    }

    /// Pump pending deadlines until the session has consumed every turn
    /// with index <= `upto`.
    fn animate_through(session: &mut MatchSession<ManualClock, RecordingSink>, clock: &ManualClock, upto: usize) {
        while !session.is_finished() && session.position().current_turn_index <= upto {
            let deadline = match session.pending_deadline() {
                Some(d) => d,
                None => break,
            };
            clock.set(deadline);
            session.tick(deadline);
        }
    }

    #[test]
    fn late_joiner_folds_without_rendering() {
        // 6 turns: round 1 ends (winner P1) at index 2, match ends at
        // index 5 (winner P1). Join at index 4.
        let tl = make_timeline(&[(3, Some(Side::P1)), (3, Some(Side::P1))], 1_000, 0, 0);
        let clock = ManualClock::at(4_500);
        let mut session = session_with(tl, &clock);
        session.begin(start_at(4, 4_500));

        assert_eq!(session.position().rounds_won, PerSide::new(1, 0));
        assert_eq!(session.position().current_round_number, 2);
        assert_eq!(session.sink().rendered_indices(), vec![4]);

        animate_through(&mut session, &clock, 5);
        assert_eq!(session.sink().rendered_indices(), vec![4, 5]);
        assert!(session.is_finished());
        assert!(session
            .sink()
            .events
            .contains(&SinkEvent::MatchEnd { winner: Some(Side::P1) }));
    }

    #[test]
    fn late_joiner_recovers_surge_from_round_start() {
        let tl = make_timeline(&[(3, Some(Side::P1)), (4, Some(Side::P2))], 1_000, 0, 0);
        let clock = ManualClock::at(4_500);
        let mut session = session_with(tl, &clock);
        // Index 4 is mid round 2; the round-start turn at index 3 carries
        // the selections.
        session.begin(start_at(4, 4_500));
        assert_eq!(session.position().active_surge, PerSide::new(Some(1), Some(2)));
    }

    #[test]
    fn suspension_across_round_boundary_folds_and_resumes() {
        // 10 turns, 1s each, gameplay starts at T0 = 0. Round 1 is turns
        // 0..=3, round 2 the rest.
        let tl = make_timeline(&[(4, Some(Side::P1)), (6, Some(Side::P2))], 1_000, 0, 0);
        let clock = ManualClock::at(0);
        let mut session = session_with(tl, &clock);
        session.begin(start_at(0, 0));
        animate_through(&mut session, &clock, 2);
        assert_eq!(session.sink().rendered_indices(), vec![0, 1, 2]);

        // Tab hidden; timers suspended. Visibility returns at T0 + 5.5s.
        clock.set(5_500);
        session.on_visible();

        // expectedIndex = 5: indices 3 and 4 were folded silently (the
        // round boundary at index 3 among them), rendering resumed at 5.
        assert_eq!(session.sink().rendered_indices(), vec![0, 1, 2, 5]);
        assert_eq!(session.position().rounds_won, PerSide::new(1, 0));
        assert_eq!(session.position().current_round_number, 2);
        assert!(session
            .sink()
            .events
            .contains(&SinkEvent::CatchingUp { target_index: 5 }));
        // The folded round end emitted no render-path notification.
        assert!(!session
            .sink()
            .events
            .iter()
            .any(|e| matches!(e, SinkEvent::RoundEnd { round_number: 1, .. })));
    }

    #[test]
    fn double_ko_increments_nobody_and_playback_continues() {
        let tl = make_timeline(&[(2, None), (2, Some(Side::P2))], 1_000, 0, 0);
        let clock = ManualClock::at(0);
        let mut session = session_with(tl, &clock);
        session.begin(start_at(0, 0));
        animate_through(&mut session, &clock, 1);

        assert_eq!(session.position().rounds_won, PerSide::new(0, 0));
        assert!(session.sink().events.contains(&SinkEvent::RoundEnd {
            round_number: 1,
            winner: None,
            double_ko: true,
        }));
        // Next round still plays.
        animate_through(&mut session, &clock, 3);
        assert_eq!(session.sink().rendered_indices(), vec![0, 1, 2, 3]);
        assert_eq!(session.position().rounds_won, PerSide::new(0, 1));
    }

    #[test]
    fn zero_turns_finishes_immediately_with_a_draw() {
        let tl = MatchTimeline::from_turns(1, Vec::new(), 1_000, 0, 0, None);
        let clock = ManualClock::at(0);
        let mut session = session_with(tl, &clock);
        session.begin(SessionStart::default());

        assert!(session.is_finished());
        assert_eq!(session.pending_deadline(), None);
        assert_eq!(
            session.sink().events,
            vec![SinkEvent::NoTurnData, SinkEvent::MatchEnd { winner: None }]
        );
    }

    #[test]
    fn non_positive_turn_duration_finishes_without_timers() {
        let tl = make_timeline(&[(2, Some(Side::P1))], 0, 0, 0);
        let clock = ManualClock::at(0);
        let mut session = session_with(tl, &clock);
        session.begin(start_at(0, 0));
        assert!(session.is_finished());
        assert_eq!(session.pending_deadline(), None);
        assert!(session.sink().rendered_indices().is_empty());
    }

    #[test]
    fn index_is_monotone_under_duplicate_and_stale_pushes() {
        let tl = make_timeline(&[(4, Some(Side::P1)), (4, Some(Side::P1))], 1_000, 0, 0);
        let clock = ManualClock::at(0);
        let mut session = session_with(tl, &clock);
        session.begin(start_at(0, 0));
        animate_through(&mut session, &clock, 1);
        let before = session.position().current_turn_index;

        // Push ahead: catch up.
        session.on_resync_push(&ResyncPush {
            match_id: 1,
            server_time: clock.local_now_ms() + 5_000,
            current_turn_index: Some(5),
            lead_in_status: None,
        });
        // Indices 2..4 folded, turn 5 rendered, cursor on the next turn.
        assert_eq!(session.sink().rendered_indices(), vec![0, 1, 5]);
        assert_eq!(session.position().current_turn_index, 6);
        assert!(session.position().current_turn_index >= before);

        // Duplicate push: no-op.
        let events_before = session.sink().events.len();
        session.on_resync_push(&ResyncPush {
            match_id: 1,
            server_time: clock.local_now_ms() + 5_000,
            current_turn_index: Some(5),
            lead_in_status: None,
        });
        assert_eq!(session.position().current_turn_index, 6);
        assert_eq!(session.sink().events.len(), events_before);

        // Stale (out-of-order) push: never rewind.
        session.on_resync_push(&ResyncPush {
            match_id: 1,
            server_time: clock.local_now_ms(),
            current_turn_index: Some(1),
            lead_in_status: None,
        });
        assert_eq!(session.position().current_turn_index, 6);
    }

    #[test]
    fn push_for_another_match_is_ignored() {
        let tl = make_timeline(&[(3, Some(Side::P1))], 1_000, 0, 0);
        let clock = ManualClock::at(0);
        let mut session = session_with(tl, &clock);
        session.begin(start_at(0, 0));
        let events_before = session.sink().events.len();

        session.on_resync_push(&ResyncPush {
            match_id: 999,
            server_time: 50_000,
            current_turn_index: Some(2),
            lead_in_status: None,
        });
        assert_eq!(session.sink().events.len(), events_before);
        assert_eq!(session.position().current_turn_index, 1);
    }

    #[test]
    fn lead_in_rescheduling_is_idempotent() {
        // Gameplay starts at authoritative t = 10_000.
        let tl = make_timeline(&[(3, Some(Side::P1))], 1_000, 0, 10_000);
        let clock = ManualClock::at(2_000);
        let mut session = session_with(tl, &clock);
        session.begin(start_at(0, 2_000));
        assert_eq!(session.phase(), SessionPhase::LeadIn);
        assert_eq!(session.pending_deadline(), Some(10_000));

        // Server says 3 s remain (its clock runs 5 s ahead of ours).
        let push = ResyncPush {
            match_id: 1,
            server_time: 7_000,
            current_turn_index: None,
            lead_in_status: Some(LeadInStatus {
                is_open: true,
                seconds_remaining: 3.0,
            }),
        };
        session.on_resync_push(&push);
        assert_eq!(session.pending_deadline(), Some(5_000));
        // Same trigger twice: exactly one active timer, same deadline.
        session.on_resync_push(&push);
        assert_eq!(session.pending_deadline(), Some(5_000));

        clock.set(5_000);
        session.tick(5_000);
        assert_eq!(session.phase(), SessionPhase::Playing);
        assert_eq!(session.sink().rendered_indices(), vec![0]);
    }

    #[test]
    fn visibility_during_lead_in_reschedules_instead_of_starting() {
        let tl = make_timeline(&[(3, Some(Side::P1))], 1_000, 0, 10_000);
        let clock = ManualClock::at(2_000);
        let mut session = session_with(tl, &clock);
        session.begin(start_at(0, 2_000));

        clock.set(4_000);
        session.on_visible();
        assert_eq!(session.phase(), SessionPhase::LeadIn);
        assert_eq!(session.pending_deadline(), Some(10_000));
        assert!(session.sink().rendered_indices().is_empty());
    }

    #[test]
    fn surge_reveal_precedes_the_round_start_render() {
        let tl = make_timeline(&[(2, Some(Side::P1))], 1_000, 0, 0);
        let clock = ManualClock::at(0);
        let mut session = session_with(tl, &clock);
        session.begin(start_at(0, 0));

        let events = &session.sink().events;
        let surge_pos = events
            .iter()
            .position(|e| matches!(e, SinkEvent::Surge { round_number: 1, .. }))
            .expect("surge reveal emitted");
        let render_pos = events
            .iter()
            .position(|e| matches!(e, SinkEvent::Turn { index: 0, .. }))
            .expect("turn rendered");
        assert!(surge_pos < render_pos);
    }

    #[test]
    fn stun_carry_over_corrects_the_presented_move() {
        // P2 ends turn 0 stunned but turn 1 records a punch.
        let mut turns = make_timeline(&[(3, Some(Side::P1))], 1_000, 0, 0)
            .turns()
            .to_vec();
        turns[0].sides.p2.is_stunned = true;
        turns[1].sides.p2.mv = MoveKind::Punch;
        let tl = MatchTimeline::from_turns(1, turns, 1_000, 0, 0, None);

        let clock = ManualClock::at(0);
        let mut session = session_with(tl, &clock);
        session.begin(start_at(0, 0));
        animate_through(&mut session, &clock, 1);

        let effective = session
            .sink()
            .events
            .iter()
            .find_map(|e| match e {
                SinkEvent::Turn {
                    index: 1,
                    effective_moves,
                } => Some(*effective_moves),
                _ => None,
            })
            .expect("turn 1 rendered");
        assert_eq!(effective.p2, MoveKind::Stunned);
        assert_eq!(effective.p1, MoveKind::Punch);
    }

    #[test]
    fn stun_does_not_carry_across_a_round_start() {
        let mut turns = make_timeline(&[(2, Some(Side::P1)), (2, Some(Side::P1))], 1_000, 0, 0)
            .turns()
            .to_vec();
        // Last turn of round 1 leaves P2 stunned; round 2 resets.
        turns[1].sides.p2.is_stunned = true;
        turns[2].sides.p2.mv = MoveKind::Kick;
        let tl = MatchTimeline::from_turns(1, turns, 1_000, 0, 0, None);

        let clock = ManualClock::at(0);
        let mut session = session_with(tl, &clock);
        session.begin(start_at(0, 0));
        animate_through(&mut session, &clock, 2);

        let effective = session
            .sink()
            .events
            .iter()
            .find_map(|e| match e {
                SinkEvent::Turn {
                    index: 2,
                    effective_moves,
                } => Some(*effective_moves),
                _ => None,
            })
            .expect("turn 2 rendered");
        assert_eq!(effective.p2, MoveKind::Kick);
    }

    #[test]
    fn destroyed_session_ignores_surviving_callbacks() {
        let tl = make_timeline(&[(4, Some(Side::P1))], 1_000, 0, 0);
        let clock = ManualClock::at(0);
        let mut session = session_with(tl, &clock);
        session.begin(start_at(0, 0));
        let deadline = session.pending_deadline().expect("pacing timer armed");

        session.destroy();
        assert_eq!(session.pending_deadline(), None);

        // A callback that survived the teardown race fires anyway.
        clock.set(deadline);
        session.tick(deadline);
        session.on_visible();
        assert_eq!(session.sink().rendered_indices(), vec![0]);
    }

    #[test]
    fn wall_clock_past_match_end_folds_everything_and_finishes() {
        let tl = make_timeline(&[(3, Some(Side::P2)), (3, Some(Side::P2))], 1_000, 0, 0);
        let clock = ManualClock::at(0);
        let mut session = session_with(tl, &clock);
        session.begin(start_at(0, 0));

        clock.set(60_000);
        session.on_visible();

        assert!(session.is_finished());
        assert_eq!(session.position().rounds_won, PerSide::new(0, 2));
        // Nothing after the suspension point was rendered.
        assert_eq!(session.sink().rendered_indices(), vec![0]);
        assert!(session
            .sink()
            .events
            .contains(&SinkEvent::MatchEnd { winner: Some(Side::P2) }));
    }

    #[test]
    fn identical_trigger_sequences_produce_identical_state() {
        let run = || {
            let tl = make_timeline(
                &[(3, Some(Side::P1)), (3, None), (2, Some(Side::P2))],
                1_000,
                0,
                0,
            );
            let clock = ManualClock::at(0);
            let mut session = session_with(tl, &clock);
            session.begin(start_at(0, 0));
            animate_through(&mut session, &clock, 1);
            clock.set(4_500);
            session.on_visible();
            session.on_resync_push(&ResyncPush {
                match_id: 1,
                server_time: 6_200,
                current_turn_index: Some(6),
                lead_in_status: None,
            });
            session.position().clone()
        };
        assert_eq!(run(), run());
    }

    fn rounds_strategy() -> impl Strategy<Value = Vec<(u32, Option<Side>)>> {
        proptest::collection::vec(
            (
                1u32..5,
                prop_oneof![Just(None), Just(Some(Side::P1)), Just(Some(Side::P2))],
            ),
            1..4,
        )
    }

    proptest! {
        /// Folding [0, n) silently then rendering from n produces the same
        /// bookkeeping as animating every turn from the start.
        #[test]
        fn fold_matches_animated_playback(
            (rounds, join_index) in rounds_strategy().prop_flat_map(|rounds| {
                let total: u32 = rounds.iter().map(|r| r.0).sum();
                (Just(rounds), 0..total as usize)
            })
        ) {
            let duration = 1_000i64;

            // Session A joins late at `join_index`.
            let clock_a = ManualClock::at(join_index as i64 * duration + 500);
            let mut a = session_with(make_timeline(&rounds, duration, 0, 0), &clock_a);
            a.begin(start_at(join_index, clock_a.local_now_ms()));
            prop_assert_eq!(a.sink().rendered_indices().first().copied(), Some(join_index));

            // Session B animates every turn from the beginning.
            let clock_b = ManualClock::at(0);
            let mut b = session_with(make_timeline(&rounds, duration, 0, 0), &clock_b);
            b.begin(start_at(0, 0));
            animate_through(&mut b, &clock_b, join_index);

            prop_assert_eq!(a.position().rounds_won, b.position().rounds_won);
            prop_assert_eq!(
                a.position().current_round_number,
                b.position().current_round_number
            );
            prop_assert_eq!(a.position().active_surge, b.position().active_surge);
        }
    }
}
