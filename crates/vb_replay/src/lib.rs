//! # vb_replay - Veilstar Brawl Turn Replay Engine
//!
//! Client-side synchronization engine that keeps a local view of a
//! turn-indexed combat match in lockstep with an authoritative,
//! pre-computed timeline of turns.
//!
//! ## Features
//! - Total normalization of heterogeneous historical turn formats
//! - Wall-clock reconstruction of the expected turn index (survives
//!   arbitrary host suspension)
//! - Silent fast-forward catch-up with bit-identical bookkeeping
//! - Cooperative, host-driven playback pacing with cancellable one-shot
//!   timers
//!
//! Rendering, audio, and move resolution live outside this crate; the
//! engine talks to them through the injected [`sink::RenderSink`] seam.

pub mod clock;
pub mod error;
pub mod normalize;
pub mod outcome;
pub mod session;
pub mod sink;
pub mod timeline;
pub mod turn;

// Re-export main types for convenience
pub use clock::{ClockReconciler, SystemClock, WallClock};
pub use error::{ReplayError, Result};
pub use normalize::{Normalizer, RawTurn};
pub use outcome::{resolve_outcome, DecidedBy, MatchOutcome};
pub use session::{MatchSession, PlaybackPosition, ResyncPush, SessionPhase, SessionStart};
pub use sink::RenderSink;
pub use timeline::{LeadInStatus, MatchPayload, MatchTimeline};
pub use turn::{FighterTurnState, MoveKind, PerSide, Side, Turn, TurnOutcome};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
