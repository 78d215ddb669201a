/// Exhaustive pairwise scheduler.
///
/// Offers every unordered pair of names exactly once, in the row-major order
/// of the upper triangle of an `n × n` grid. Pairs are derived from a linear
/// index on demand, so memory grows only with the recorded preferences.
use std::collections::HashMap;

use crate::types::{MatchRecord, Matchup, Preference, VoteOutcome};

#[derive(Debug, Clone)]
pub struct PairScheduler {
    /// Fixed order; positions are identity for the pair sequence.
    items: Vec<String>,
    /// Sparse map of ordered `(a, b)` keys to what was recorded for them.
    preferences: HashMap<(String, String), Preference>,
    /// Every pair before this index has a recorded preference.
    current_index: usize,
    /// Pair touched by the most recent `record_preference`, if still revertible.
    last_match: Option<(String, String)>,
}

impl PairScheduler {
    pub fn new(items: Vec<String>) -> Self {
        PairScheduler {
            items,
            preferences: HashMap::new(),
            current_index: 0,
            last_match: None,
        }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// `n * (n - 1) / 2`.
    pub fn total_pairs(&self) -> usize {
        let n = self.items.len();
        n * n.saturating_sub(1) / 2
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Number of distinct pairs with a recorded preference.
    pub fn comparisons_recorded(&self) -> usize {
        let directed = self.preferences.len();
        let ties = self
            .preferences
            .iter()
            .filter(|((a, b), p)| {
                **p == Preference::Tie && self.preferences.contains_key(&(b.clone(), a.clone()))
            })
            .count();
        // A tie is stored under both orders; count it once.
        directed - ties / 2
    }

    pub fn can_undo(&self) -> bool {
        self.last_match.is_some()
    }

    /// True when either `(a, b)` or `(b, a)` has been recorded.
    pub fn has_compared(&self, a: &str, b: &str) -> bool {
        self.preferences.contains_key(&(a.to_string(), b.to_string()))
            || self.preferences.contains_key(&(b.to_string(), a.to_string()))
    }

    /// What was recorded for the ordered key `(a, b)`.
    pub fn preference(&self, a: &str, b: &str) -> Option<Preference> {
        self.preferences.get(&(a.to_string(), b.to_string())).copied()
    }

    /// The next pair with no recorded preference, or `None` when the schedule
    /// is exhausted. Does not advance the schedule.
    pub fn next_pair(&self) -> Option<Matchup> {
        let total = self.total_pairs();
        let mut index = self.current_index;
        while index < total {
            let (i, j) = self.pair_at(index)?;
            if !self.has_compared(&self.items[i], &self.items[j]) {
                return Some(Matchup::new(self.items[i].clone(), self.items[j].clone()));
            }
            index += 1;
        }
        None
    }

    /// Record the result of a vote between `left` and `right`.
    ///
    /// A decisive vote is stored under `(winner, loser)`; a tie is stored
    /// under both orders so the pair is never offered again.
    pub fn record_preference(&mut self, left: &str, right: &str, outcome: VoteOutcome) {
        self.insert(left, right, outcome);
        self.last_match = Some((left.to_string(), right.to_string()));
        self.advance();
    }

    /// Revert the most recent `record_preference`. Older preferences stay.
    /// Returns false when there is nothing to revert.
    pub fn undo_last(&mut self) -> bool {
        let Some((a, b)) = self.last_match.take() else {
            return false;
        };
        self.preferences.remove(&(a.clone(), b.clone()));
        self.preferences.remove(&(b.clone(), a.clone()));

        let reopened = self.index_of(&a, &b).unwrap_or(0);
        self.current_index = self.current_index.saturating_sub(1).min(reopened);
        true
    }

    /// Rebuild preferences from a vote log.
    ///
    /// Order-independent: every historical preference is inserted before the
    /// next pair is computed. The last record becomes revertible.
    pub fn rehydrate(&mut self, history: &[MatchRecord]) {
        for record in history {
            self.insert(&record.matchup.left, &record.matchup.right, record.vote_type);
        }
        self.current_index = 0;
        self.advance();
        self.last_match = history
            .last()
            .map(|r| (r.matchup.left.clone(), r.matchup.right.clone()));
    }

    fn insert(&mut self, left: &str, right: &str, outcome: VoteOutcome) {
        let (l, r) = (left.to_string(), right.to_string());
        match outcome {
            VoteOutcome::Left => {
                self.preferences.insert((l, r), Preference::Win);
            }
            VoteOutcome::Right => {
                self.preferences.insert((r, l), Preference::Win);
            }
            VoteOutcome::Both | VoteOutcome::Neither => {
                self.preferences.insert((l.clone(), r.clone()), Preference::Tie);
                self.preferences.insert((r, l), Preference::Tie);
            }
        }
    }

    /// Move `current_index` past every already-recorded pair at the front.
    fn advance(&mut self) {
        let total = self.total_pairs();
        while self.current_index < total {
            match self.pair_at(self.current_index) {
                Some((i, j)) if self.has_compared(&self.items[i], &self.items[j]) => {
                    self.current_index += 1;
                }
                _ => break,
            }
        }
    }

    /// Map a linear index to `(i, j)` with `i < j`. Row `i` holds `n - 1 - i` pairs.
    fn pair_at(&self, index: usize) -> Option<(usize, usize)> {
        let n = self.items.len();
        let mut remaining = index;
        for i in 0..n.saturating_sub(1) {
            let row_len = n - 1 - i;
            if remaining < row_len {
                return Some((i, i + 1 + remaining));
            }
            remaining -= row_len;
        }
        None
    }

    /// Linear index of the pair made of `a` and `b`, in either order.
    fn index_of(&self, a: &str, b: &str) -> Option<usize> {
        let ia = self.items.iter().position(|x| x == a)?;
        let ib = self.items.iter().position(|x| x == b)?;
        let (i, j) = if ia < ib { (ia, ib) } else { (ib, ia) };
        if i == j {
            return None;
        }
        let n = self.items.len();
        Some(i * n - i * (i + 1) / 2 + (j - i - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("name{i}")).collect()
    }

    fn unordered(m: &Matchup) -> (String, String) {
        if m.left < m.right {
            (m.left.clone(), m.right.clone())
        } else {
            (m.right.clone(), m.left.clone())
        }
    }

    #[test]
    fn test_row_major_order() {
        let mut s = PairScheduler::new(names(4));
        let mut seen = Vec::new();
        while let Some(m) = s.next_pair() {
            seen.push((m.left.clone(), m.right.clone()));
            s.record_preference(&m.left, &m.right, VoteOutcome::Left);
        }
        let expected: Vec<(String, String)> = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]
            .iter()
            .map(|&(i, j)| (format!("name{i}"), format!("name{j}")))
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_pair_index_roundtrip() {
        let s = PairScheduler::new(names(7));
        for k in 0..s.total_pairs() {
            let (i, j) = s.pair_at(k).unwrap();
            assert!(i < j);
            assert_eq!(s.index_of(&s.items[i], &s.items[j]), Some(k));
        }
        assert_eq!(s.pair_at(s.total_pairs()), None);
    }

    #[test]
    fn test_fewer_than_two_items() {
        assert_eq!(PairScheduler::new(Vec::new()).next_pair(), None);
        assert_eq!(PairScheduler::new(names(1)).next_pair(), None);
        assert_eq!(PairScheduler::new(names(1)).total_pairs(), 0);
    }

    #[test]
    fn test_next_pair_does_not_advance() {
        let s = PairScheduler::new(names(3));
        assert_eq!(s.next_pair(), s.next_pair());
        assert_eq!(s.current_index(), 0);
    }

    #[test]
    fn test_right_vote_stored_winner_first() {
        let mut s = PairScheduler::new(names(2));
        s.record_preference("name0", "name1", VoteOutcome::Right);
        assert_eq!(s.preference("name1", "name0"), Some(Preference::Win));
        assert_eq!(s.preference("name0", "name1"), None);
        assert_eq!(s.next_pair(), None);
    }

    #[test]
    fn test_tie_writes_both_keys() {
        let mut s = PairScheduler::new(names(3));
        s.record_preference("name0", "name1", VoteOutcome::Neither);
        assert_eq!(s.preference("name0", "name1"), Some(Preference::Tie));
        assert_eq!(s.preference("name1", "name0"), Some(Preference::Tie));
        assert_eq!(s.comparisons_recorded(), 1);
        assert!(!s.next_pair().unwrap().same_pair(&Matchup::new("name0", "name1")));
    }

    #[test]
    fn test_undo_reoffers_same_pair() {
        let mut s = PairScheduler::new(names(4));
        s.record_preference("name0", "name1", VoteOutcome::Left);
        let pair = s.next_pair().unwrap();
        s.record_preference(&pair.left, &pair.right, VoteOutcome::Both);

        assert!(s.undo_last());
        assert_eq!(s.next_pair(), Some(pair));
        assert_eq!(s.current_index(), 1);
        // Only one step back.
        assert!(!s.undo_last());
        assert!(s.has_compared("name0", "name1"));
    }

    #[test]
    fn test_undo_on_fresh_scheduler() {
        let mut s = PairScheduler::new(names(3));
        assert!(!s.undo_last());
        assert_eq!(s.current_index(), 0);
    }

    #[test]
    fn test_rehydrate_skips_recorded_pairs() {
        use crate::types::MatchRecord;
        use chrono::{DateTime, Utc};

        let record = |l: &str, r: &str, vote| MatchRecord {
            matchup: Matchup::new(l, r),
            winner: None,
            loser: None,
            vote_type: vote,
            match_number: 1,
            round_number: 1,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            ratings_before: Vec::new(),
        };
        // Out of schedule order on purpose.
        let history = vec![
            record("name1", "name2", VoteOutcome::Right),
            record("name0", "name1", VoteOutcome::Left),
        ];

        let mut s = PairScheduler::new(names(3));
        s.rehydrate(&history);
        assert_eq!(s.next_pair(), Some(Matchup::new("name0", "name2")));
        assert_eq!(s.current_index(), 1);
        assert!(s.can_undo());
        assert!(s.undo_last());
        assert_eq!(s.next_pair(), Some(Matchup::new("name0", "name1")));
    }

    proptest! {
        #[test]
        fn test_never_repeats_and_exhausts(
            n in 0usize..12,
            votes in proptest::collection::vec(0u8..4, 0..80),
            undo_mask in proptest::collection::vec(any::<bool>(), 0..80),
        ) {
            let mut s = PairScheduler::new(names(n));
            let mut offered: HashSet<(String, String)> = HashSet::new();
            let mut recorded = 0usize;

            for (step, v) in votes.iter().enumerate() {
                let Some(m) = s.next_pair() else { break };
                let key = unordered(&m);
                // A pair only comes back if its vote was undone.
                prop_assert!(!s.has_compared(&m.left, &m.right));
                offered.insert(key);

                let outcome = match v {
                    0 => VoteOutcome::Left,
                    1 => VoteOutcome::Right,
                    2 => VoteOutcome::Both,
                    _ => VoteOutcome::Neither,
                };
                s.record_preference(&m.left, &m.right, outcome);
                recorded += 1;

                if undo_mask.get(step).copied().unwrap_or(false) && s.undo_last() {
                    recorded -= 1;
                    let again = s.next_pair();
                    prop_assert_eq!(again.as_ref().map(unordered), Some(unordered(&m)));
                }
                prop_assert_eq!(s.comparisons_recorded(), recorded);
            }

            // Drain the rest: every pair exactly once, then None.
            let mut drained = 0usize;
            while let Some(m) = s.next_pair() {
                s.record_preference(&m.left, &m.right, VoteOutcome::Left);
                drained += 1;
                prop_assert!(drained <= s.total_pairs());
            }
            prop_assert_eq!(s.comparisons_recorded(), s.total_pairs());
            prop_assert!(recorded + drained == s.total_pairs());
            prop_assert_eq!(s.next_pair(), None);
        }
    }
}
