/// Terminal rendering of the pair on screen.
use std::collections::HashMap;

use namerank_core::{Matchup, SessionSnapshot};

pub const HELP: &str = "\
  1 / l   pick the left name
  2 / r   pick the right name
  b       like both
  n       like neither
  u       undo the last vote
  q       save and quit";

/// Progress header, e.g. "Round 2 · Match 5 of 10 (40%)".
pub fn progress_line(snapshot: &SessionSnapshot) -> String {
    format!(
        "Round {} · Match {} of {} ({:.0}%)",
        snapshot.round_number,
        snapshot.current_match_number,
        snapshot.total_matches,
        snapshot.progress * 100.0,
    )
}

pub fn round_banner(round: u32) -> String {
    format!("=== Round {round} ===")
}

/// Build the block printed before each vote. Descriptions are keyed by name.
pub fn render_match(
    snapshot: &SessionSnapshot,
    matchup: &Matchup,
    descriptions: &HashMap<String, String>,
) -> String {
    let option = |slot: usize, name: &str| match descriptions.get(name) {
        Some(desc) => format!("  [{slot}] {name}  ({desc})"),
        None => format!("  [{slot}] {name}"),
    };

    let mut out = String::new();
    if let Some(round) = snapshot.round_banner {
        out.push_str(&round_banner(round));
        out.push_str("\n\n");
    }
    out.push_str(&progress_line(snapshot));
    out.push_str("\n\n");
    out.push_str(&option(1, &matchup.left));
    out.push('\n');
    out.push_str(&option(2, &matchup.right));
    out.push_str("\n\n");
    if snapshot.can_undo {
        out.push_str("1/2 pick · b both · n neither · u undo · q quit");
    } else {
        out.push_str("1/2 pick · b both · n neither · q quit");
    }
    out
}
