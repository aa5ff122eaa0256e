//! Clock reconciliation
//!
//! The match timeline is anchored to the authoritative server clock, while
//! every timer the host gives us runs on the local device clock — which may
//! drift from the server and whose timers are suspended entirely while the
//! client is backgrounded. [`ClockReconciler`] keeps the offset between the
//! two so "now" can always be converted to authoritative time, which is the
//! only reconstruction that survives an arbitrary suspension.

use chrono::Utc;

/// Source of local wall-clock time in epoch milliseconds. Injected so tests
/// and headless hosts control time explicitly.
pub trait WallClock {
    fn local_now_ms(&self) -> i64;
}

/// The device clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn local_now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Stores `offset_ms = authoritative_now - local_now`, recomputed from
/// scratch whenever a fresh authoritative timestamp arrives. Repeated
/// updates with the same input are idempotent; there is no accumulation.
#[derive(Debug, Clone)]
pub struct ClockReconciler<C> {
    clock: C,
    offset_ms: i64,
}

impl<C: WallClock> ClockReconciler<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, offset_ms: 0 }
    }

    pub fn update_offset(&mut self, authoritative_now_ms: i64) {
        self.offset_ms = authoritative_now_ms - self.clock.local_now_ms();
    }

    /// Authoritative "now".
    pub fn now(&self) -> i64 {
        self.clock.local_now_ms() + self.offset_ms
    }

    pub fn local_now_ms(&self) -> i64 {
        self.clock.local_now_ms()
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }
}
