/// Input parsing: candidate lists, rating files and vote commands typed at the prompt.
use namerank_core::{CandidateItem, FinalRating, Rating, RatingMap, VoteOutcome};
use serde::Deserialize;
use std::collections::HashSet;

/// One line of input during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Vote(VoteOutcome),
    Undo,
    Help,
    Quit,
}

/// Parse a line typed at the match prompt. Case-insensitive; `None` for anything unknown.
pub fn parse_command(input: &str) -> Option<Command> {
    let cmd = input.trim().to_ascii_lowercase();
    let parsed = match cmd.as_str() {
        "1" | "l" | "left" => Command::Vote(VoteOutcome::Left),
        "2" | "r" | "right" => Command::Vote(VoteOutcome::Right),
        "b" | "both" | "=" => Command::Vote(VoteOutcome::Both),
        "n" | "neither" | "0" => Command::Vote(VoteOutcome::Neither),
        "u" | "undo" => Command::Undo,
        "h" | "?" | "help" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        _ => return None,
    };
    Some(parsed)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ItemEntry {
    Name(String),
    Full(CandidateItem),
}

/// Parse a string as either a JSON array (of names or candidate objects) or
/// plain text, one name per line. Blank names are dropped.
pub fn parse_items_from_str(content: &str) -> Result<Vec<CandidateItem>, String> {
    let trimmed = content.trim();
    let items: Vec<CandidateItem> = if trimmed.starts_with('[') {
        let entries: Vec<ItemEntry> = serde_json::from_str(trimmed)
            .map_err(|e| format!("File looks like JSON but failed to parse: {e}"))?;
        entries
            .into_iter()
            .map(|e| match e {
                ItemEntry::Name(name) => CandidateItem::new(name.trim()),
                ItemEntry::Full(mut item) => {
                    item.name = item.name.trim().to_string();
                    item
                }
            })
            .collect()
    } else {
        trimmed
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.starts_with('#'))
            .map(CandidateItem::new)
            .collect()
    };
    Ok(items.into_iter().filter(|i: &CandidateItem| !i.name.is_empty()).collect())
}

/// First name that appears more than once, if any. Names identify
/// candidates in a session, so a list with repeats cannot be voted on.
pub fn find_duplicate_name(items: &[CandidateItem]) -> Option<&str> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|i| i.name.as_str())
        .find(|name| !seen.insert(*name))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RatingsFile {
    Map(RatingMap),
    List(Vec<FinalRating>),
}

/// Parse a ratings file: either `{ "name": { "rating", "wins", "losses" } }`
/// or the array written by `--json` / a finished session.
pub fn parse_ratings_from_str(content: &str) -> Result<RatingMap, String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(RatingMap::new());
    }
    let parsed: RatingsFile =
        serde_json::from_str(trimmed).map_err(|e| format!("Failed to parse ratings: {e}"))?;
    Ok(match parsed {
        RatingsFile::Map(map) => map,
        RatingsFile::List(list) => list
            .into_iter()
            .map(|f| (f.name, Rating::new(f.rating, f.wins, f.losses)))
            .collect(),
    })
}
