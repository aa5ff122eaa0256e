//! Veilstar Brawl replay CLI
//!
//! Headless playback and inspection of pre-computed match payloads.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vb_replay::{
    resolve_outcome, MatchOutcome, MatchPayload, MatchSession, MatchTimeline, MoveKind,
    PerSide, PlaybackPosition, RenderSink, SessionStart, Side, SystemClock, Turn, WallClock,
};

#[derive(Parser)]
#[command(name = "vb_cli")]
#[command(about = "Replay and inspect Veilstar Brawl match payloads", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a match payload turn by turn
    Replay {
        /// Input payload JSON file
        #[arg(long)]
        r#in: PathBuf,

        /// Turn index to join at (late-joiner entry)
        #[arg(long, default_value = "0")]
        from: usize,

        /// Pace output with the real clock instead of replaying instantly
        #[arg(long, default_value = "false")]
        realtime: bool,
    },

    /// Validate a payload and report its structure and resolved outcome
    Verify {
        /// Input payload JSON file
        #[arg(long)]
        r#in: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Replay { r#in, from, realtime } => replay(&r#in, from, realtime),
        Commands::Verify { r#in } => verify(&r#in),
    }
}

fn load_payload(path: &PathBuf) -> Result<MatchPayload> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading payload {}", path.display()))?;
    MatchPayload::from_json(&json).with_context(|| format!("parsing payload {}", path.display()))
}

fn replay(path: &PathBuf, from: usize, realtime: bool) -> Result<()> {
    let payload = load_payload(path)?;
    let timeline = Arc::new(MatchTimeline::from_payload(&payload));

    println!("🥊 Replaying match {} ({} turns)", timeline.match_id(), timeline.len());

    let mut start = SessionStart::from_payload(&payload);
    start.start_index = start.start_index.max(from);
    // Anchor the authoritative clock at the join index so a recorded match
    // replays from there instead of fast-forwarding straight to its end.
    let step = timeline.turn_duration_ms().max(1);
    start.server_time =
        Some(timeline.gameplay_start_at() + start.start_index as i64 * step + step / 2);
    start.lead_in_status = None;

    let mut session = MatchSession::new(timeline, SystemClock, PrintSink);
    session.begin(start);

    if realtime {
        while !session.is_finished() {
            std::thread::sleep(Duration::from_millis(25));
            session.tick(SystemClock.local_now_ms());
        }
    } else {
        // Fire each pending deadline as soon as it is armed.
        while let Some(deadline) = session.pending_deadline() {
            session.tick(deadline);
        }
    }
    Ok(())
}

fn verify(path: &PathBuf) -> Result<()> {
    let payload = load_payload(path)?;
    let (timeline, degraded) = MatchTimeline::from_payload_reporting(&payload);

    println!("🔍 Verifying match payload...");
    println!("   Match id: {}", timeline.match_id());
    println!("   Turns:    {}", timeline.len());
    println!("   Pacing:   {} ms/turn", timeline.turn_duration_ms());
    println!("   Lead-in:  {} ms", timeline.lead_in_window_ms());

    for (index, turn) in timeline.turns().iter().enumerate() {
        if turn.is_round_end {
            let winner = match turn.round_winner {
                Some(side) => format!("winner {}", side_name(side)),
                None => "double KO".to_string(),
            };
            println!(
                "   Round {:>2} ends at turn index {:>3} ({})",
                turn.round_number, index, winner
            );
        }
    }

    let mut position = PlaybackPosition::default();
    position.fold_over(&timeline, 0, timeline.len());
    let outcome = resolve_outcome(&timeline, &position.rounds_won);
    print_outcome(&outcome);

    if degraded {
        println!("⚠️  Some turn records needed fallback normalization (see warnings)");
    }
    Ok(())
}

fn side_name(side: Side) -> &'static str {
    match side {
        Side::P1 => "P1",
        Side::P2 => "P2",
    }
}

fn move_name(mv: MoveKind) -> &'static str {
    match mv {
        MoveKind::Punch => "punch",
        MoveKind::Kick => "kick",
        MoveKind::Block => "block",
        MoveKind::Special => "special",
        MoveKind::Stunned => "stunned",
    }
}

fn print_outcome(outcome: &MatchOutcome) {
    let verdict = match outcome.winner {
        Some(side) => format!("{} wins", side_name(side)),
        None => "draw".to_string(),
    };
    println!(
        "✅ Outcome: {} {}-{} (decided by {:?})",
        verdict, outcome.rounds_won.p1, outcome.rounds_won.p2, outcome.decided_by
    );
}

/// Render sink that narrates the match to stdout.
struct PrintSink;

impl RenderSink for PrintSink {
    fn surge_revealed(
        &mut self,
        round_number: u32,
        offered: &[u32],
        selections: &PerSide<Option<u32>>,
    ) {
        println!(
            "⚡ Round {} surge offer {:?} — P1 picks {:?}, P2 picks {:?}",
            round_number, offered, selections.p1, selections.p2
        );
    }

    fn render_turn(&mut self, index: usize, turn: &Turn, effective_moves: PerSide<MoveKind>) {
        println!(
            "[{:>3}] R{} T{:<2} P1 {:<7} ({:>3} hp) | P2 {:<7} ({:>3} hp)",
            index,
            turn.round_number,
            turn.turn_number,
            move_name(effective_moves.p1),
            turn.sides.p1.hp_after,
            move_name(effective_moves.p2),
            turn.sides.p2.hp_after,
        );
        if let Some(narrative) = &turn.narrative {
            println!("      {}", narrative);
        }
    }

    fn round_ended(
        &mut self,
        round_number: u32,
        winner: Option<Side>,
        double_ko: bool,
        rounds_won: &PerSide<u32>,
    ) {
        let verdict = match winner {
            Some(side) => format!("{} takes the round", side_name(side)),
            None if double_ko => "double KO".to_string(),
            None => "draw".to_string(),
        };
        println!(
            "🔔 Round {} over: {} (score {}-{})",
            round_number, verdict, rounds_won.p1, rounds_won.p2
        );
    }

    fn match_ended(&mut self, outcome: &MatchOutcome) {
        print_outcome(outcome);
    }

    fn catching_up(&mut self, target_index: usize) {
        println!("⏩ Catching up to turn index {}...", target_index);
    }

    fn no_turn_data(&mut self) {
        println!("❌ No turn data available for this match");
    }
}
