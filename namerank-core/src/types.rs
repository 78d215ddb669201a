use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_RATING;

/// A name offered for ranking.
///
/// Identity is `id` when present, otherwise `name`. Hidden items are kept
/// out of the session entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateItem {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

impl CandidateItem {
    pub fn new(name: impl Into<String>) -> Self {
        CandidateItem {
            id: None,
            name: name.into(),
            description: None,
            hidden: false,
        }
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        CandidateItem {
            id: Some(id.into()),
            ..CandidateItem::new(name)
        }
    }

    pub fn identity(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

/// Per-name rating record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub rating: f64,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
}

impl Default for Rating {
    fn default() -> Self {
        Rating {
            rating: DEFAULT_RATING,
            wins: 0,
            losses: 0,
        }
    }
}

impl Rating {
    pub fn new(rating: f64, wins: u32, losses: u32) -> Self {
        Rating { rating, wins, losses }
    }

    /// Replace a non-finite rating with the default. Counters are kept.
    pub fn normalized(self) -> Self {
        if self.rating.is_finite() {
            self
        } else {
            Rating { rating: DEFAULT_RATING, ..self }
        }
    }

    pub fn games_played(&self) -> u32 {
        self.wins + self.losses
    }
}

/// Ratings keyed by candidate name (not id).
pub type RatingMap = HashMap<String, Rating>;

/// What the voter picked for the pair on screen.
///
/// `Both` and `Neither` score the same (a draw) but stay distinct in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteOutcome {
    Left,
    Right,
    Both,
    Neither,
}

impl VoteOutcome {
    /// Actual scores `(left, right)`.
    pub fn scores(self) -> (f64, f64) {
        match self {
            VoteOutcome::Left => (1.0, 0.0),
            VoteOutcome::Right => (0.0, 1.0),
            VoteOutcome::Both | VoteOutcome::Neither => (0.5, 0.5),
        }
    }

    pub fn is_tie(self) -> bool {
        matches!(self, VoteOutcome::Both | VoteOutcome::Neither)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VoteOutcome::Left => "left",
            VoteOutcome::Right => "right",
            VoteOutcome::Both => "both",
            VoteOutcome::Neither => "neither",
        }
    }
}

/// A recorded fact about an ordered `(a, b)` key in the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    /// `a` beat `b`.
    Win,
    /// No information: both liked, or neither.
    Tie,
}

/// Two names shown together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Matchup {
    pub left: String,
    pub right: String,
}

impl Matchup {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Matchup {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn involves(&self, name: &str) -> bool {
        self.left == name || self.right == name
    }

    /// Same two names, either side.
    pub fn same_pair(&self, other: &Matchup) -> bool {
        (self.left == other.left && self.right == other.right)
            || (self.left == other.right && self.right == other.left)
    }
}

/// Rating of one name right before a vote touched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSnapshot {
    pub name: String,
    pub rating: Rating,
}

/// One entry of the session's vote log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    #[serde(rename = "match")]
    pub matchup: Matchup,
    /// `None` for `both`/`neither`.
    pub winner: Option<String>,
    pub loser: Option<String>,
    pub vote_type: VoteOutcome,
    pub match_number: u32,
    pub round_number: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub ratings_before: Vec<RatingSnapshot>,
}

/// Completion output for one name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalRating {
    pub name: String,
    pub rating: f64,
    pub wins: u32,
    pub losses: u32,
}

/// Collect ratings for `names` into completion order: rating descending,
/// ties broken by name so the output is stable.
pub fn sorted_final_ratings<'a>(
    names: impl IntoIterator<Item = &'a String>,
    ratings: &RatingMap,
) -> Vec<FinalRating> {
    let mut out: Vec<FinalRating> = names
        .into_iter()
        .map(|name| {
            let r = ratings.get(name).copied().unwrap_or_default();
            FinalRating {
                name: name.clone(),
                rating: r.rating,
                wins: r.wins,
                losses: r.losses,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.rating
            .partial_cmp(&a.rating)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_falls_back_to_name() {
        assert_eq!(CandidateItem::new("Luna").identity(), "Luna");
        assert_eq!(CandidateItem::with_id("n-7", "Luna").identity(), "n-7");
    }

    #[test]
    fn test_rating_normalized() {
        let r = Rating::new(f64::NAN, 3, 2).normalized();
        assert_eq!(r.rating, DEFAULT_RATING);
        assert_eq!(r.games_played(), 5);
        assert_eq!(Rating::new(1620.0, 0, 0).normalized().rating, 1620.0);
    }

    #[test]
    fn test_vote_outcome_serializes_lowercase() {
        let json = serde_json::to_string(&VoteOutcome::Neither).unwrap();
        assert_eq!(json, "\"neither\"");
        assert!(VoteOutcome::Both.is_tie());
        assert!(!VoteOutcome::Right.is_tie());
    }

    #[test]
    fn test_match_record_field_names() {
        let record = MatchRecord {
            matchup: Matchup::new("Luna", "Milo"),
            winner: Some("Luna".into()),
            loser: Some("Milo".into()),
            vote_type: VoteOutcome::Left,
            match_number: 1,
            round_number: 1,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            ratings_before: Vec::new(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("match").is_some());
        assert_eq!(value["voteType"], "left");
        assert_eq!(value["matchNumber"], 1);
    }

    #[test]
    fn test_sorted_final_ratings_order() {
        let names: Vec<String> = vec!["Milo".into(), "Luna".into(), "Oliver".into()];
        let mut ratings = RatingMap::new();
        ratings.insert("Milo".into(), Rating::new(1500.0, 0, 0));
        ratings.insert("Luna".into(), Rating::new(1540.0, 2, 0));
        ratings.insert("Oliver".into(), Rating::new(1500.0, 0, 1));

        let out = sorted_final_ratings(&names, &ratings);
        let order: Vec<&str> = out.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(order, vec!["Luna", "Milo", "Oliver"]);
    }
}
