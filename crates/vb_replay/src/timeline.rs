//! Match timeline
//!
//! The authoritative, pre-computed sequence of canonical turns plus the
//! match metadata needed to anchor playback to the server clock. Built once
//! from a [`MatchPayload`], immutable afterwards; spectating sessions share
//! it behind an `Arc`.

use serde::Deserialize;
use tracing::warn;

use crate::error::Result;
use crate::normalize::{Normalizer, RawTurn};
use crate::turn::{Side, Turn};

/// Pre-match lead-in ("betting") window state as reported by the server.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadInStatus {
    #[serde(alias = "open")]
    pub is_open: bool,
    #[serde(default, alias = "remainingSeconds")]
    pub seconds_remaining: f64,
}

/// Bulk match data as supplied by the match-computation service at session
/// start. Field aliases cover the historical payload revisions; matches are
/// keyed upstream by numeric session id, hence the `sessionId` alias.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPayload {
    #[serde(alias = "sessionId")]
    pub match_id: u64,
    /// Kept as raw JSON values so one garbage element degrades to a default
    /// record instead of failing the whole payload.
    #[serde(default)]
    pub turns: Vec<serde_json::Value>,
    #[serde(default, alias = "turnCount")]
    pub total_turns: Option<usize>,
    #[serde(alias = "turnDuration", alias = "turnIntervalMs")]
    pub turn_duration_ms: i64,
    #[serde(alias = "createdAt", alias = "matchCreated")]
    pub match_created_at: i64,
    #[serde(default, alias = "bettingWindowMs", alias = "leadInMs")]
    pub lead_in_window_ms: i64,
    #[serde(default, alias = "bettingStatus")]
    pub lead_in_status: Option<LeadInStatus>,
    #[serde(default, alias = "serverNow")]
    pub server_time: Option<i64>,
    #[serde(default, alias = "matchWinner")]
    pub recorded_winner: Option<String>,
    /// Late-joiner start index, when the server provides one.
    #[serde(default, alias = "currentTurnIndex")]
    pub start_turn_index: Option<usize>,
}

impl MatchPayload {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Ordered, immutable sequence of canonical turns plus match metadata.
#[derive(Debug, Clone)]
pub struct MatchTimeline {
    match_id: u64,
    turns: Vec<Turn>,
    turn_duration_ms: i64,
    match_created_at: i64,
    lead_in_window_ms: i64,
    recorded_winner: Option<Side>,
}

impl MatchTimeline {
    /// Normalize a payload's raw turns into a timeline. Total: malformed
    /// turn records degrade through the normalizer's fallback rules.
    pub fn from_payload(payload: &MatchPayload) -> Self {
        Self::from_payload_reporting(payload).0
    }

    /// Like [`Self::from_payload`], additionally reporting whether any
    /// fallback rule fired. Used by inspection tooling.
    pub fn from_payload_reporting(payload: &MatchPayload) -> (Self, bool) {
        let mut normalizer = Normalizer::new();
        let mut warned_bad_element = false;
        let count = match payload.total_turns {
            Some(n) => n.min(payload.turns.len()),
            None => payload.turns.len(),
        };

        let mut turns: Vec<Turn> = Vec::with_capacity(count);
        for (index, value) in payload.turns.iter().take(count).enumerate() {
            let raw: RawTurn = match serde_json::from_value(value.clone()) {
                Ok(raw) => raw,
                Err(e) => {
                    if !warned_bad_element {
                        warned_bad_element = true;
                        warn!(index, error = %e, "unreadable turn record; substituting defaults");
                    }
                    RawTurn::default()
                }
            };
            let turn = normalizer.normalize(&raw, turns.last(), index);
            turns.push(turn);
        }

        let degraded = normalizer.degraded() || warned_bad_element;
        let timeline = Self {
            match_id: payload.match_id,
            turns,
            turn_duration_ms: payload.turn_duration_ms,
            match_created_at: payload.match_created_at,
            lead_in_window_ms: payload.lead_in_window_ms,
            recorded_winner: payload
                .recorded_winner
                .as_deref()
                .and_then(Side::from_label),
        };
        (timeline, degraded)
    }

    /// Build a timeline from already-canonical turns (tooling and tests).
    pub fn from_turns(
        match_id: u64,
        turns: Vec<Turn>,
        turn_duration_ms: i64,
        match_created_at: i64,
        lead_in_window_ms: i64,
        recorded_winner: Option<Side>,
    ) -> Self {
        Self {
            match_id,
            turns,
            turn_duration_ms,
            match_created_at,
            lead_in_window_ms,
            recorded_winner,
        }
    }

    pub fn match_id(&self) -> u64 {
        self.match_id
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turn_duration_ms(&self) -> i64 {
        self.turn_duration_ms
    }

    pub fn match_created_at(&self) -> i64 {
        self.match_created_at
    }

    pub fn lead_in_window_ms(&self) -> i64 {
        self.lead_in_window_ms
    }

    pub fn recorded_winner(&self) -> Option<Side> {
        self.recorded_winner
    }

    /// Authoritative instant turn 0 begins.
    pub fn gameplay_start_at(&self) -> i64 {
        self.match_created_at + self.lead_in_window_ms
    }

    /// The full turn array is known up front, so an out-of-range index is a
    /// programming error, not a runtime condition.
    pub fn turn_at(&self, index: usize) -> &Turn {
        &self.turns[index]
    }

    pub fn get(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index)
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Nearest round-start turn of `round_number` at or before
    /// `search_up_to_index`. Used when a client joins mid-round and must
    /// recover the round's surge offer without having observed it.
    pub fn find_round_start(&self, round_number: u32, search_up_to_index: usize) -> Option<usize> {
        if self.turns.is_empty() {
            return None;
        }
        let from = search_up_to_index.min(self.turns.len() - 1);
        (0..=from)
            .rev()
            .find(|&i| self.turns[i].is_round_start && self.turns[i].round_number == round_number)
    }
}
