/// Voting session orchestrator.
///
/// Pure state machine without timers or IO; it never reads the clock. The caller
/// passes `now` into every operation; transition and banner deadlines are plain
/// timestamps checked against it. Persistence goes through the injected
/// `KeyValueStore`.
use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::constants::{ROUND_BANNER_MS, TRANSITION_DELAY_MS, VOTE_COOLDOWN_MS};
use crate::elo;
use crate::error::SessionError;
use crate::pairing::PairScheduler;
use crate::store::{candidate_set_key, KeyValueStore, SessionState, SessionStore};
use crate::types::{
    sorted_final_ratings, CandidateItem, FinalRating, MatchRecord, Matchup, RatingMap,
    RatingSnapshot, VoteOutcome,
};

/// Timing and budget knobs for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub vote_cooldown: Duration,
    pub transition_delay: Duration,
    pub round_banner_duration: Duration,
    /// Stop after this many votes even if pairs remain. `None` = all pairs.
    pub max_matches: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            vote_cooldown: Duration::milliseconds(VOTE_COOLDOWN_MS),
            transition_delay: Duration::milliseconds(TRANSITION_DELAY_MS),
            round_banner_duration: Duration::milliseconds(ROUND_BANNER_MS),
            max_matches: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Uninitialized,
    Active,
    Transitioning,
    Complete,
    Error,
}

/// Why a vote or undo was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Session is uninitialized, failed setup, or already complete.
    NotActive,
    /// The previous vote's transition is still running.
    Transitioning,
    /// Arrived inside the cooldown window of the previous vote.
    Cooldown,
    /// Nothing to undo.
    NothingToUndo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoteResult {
    Ignored(IgnoreReason),
    /// Vote applied; `next` is revealed once the transition ends.
    Next { next: Matchup, round_changed: bool },
    /// Vote applied and the session finished.
    Completed(Vec<FinalRating>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UndoResult {
    Ignored(IgnoreReason),
    /// The undone pair is current again.
    Reverted(Matchup),
}

/// Read-only view for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub current_match: Option<Matchup>,
    pub is_transitioning: bool,
    pub round_number: u32,
    pub current_match_number: u32,
    pub total_matches: u32,
    pub can_undo: bool,
    pub is_error: bool,
    pub round_banner: Option<u32>,
    pub progress: f64,
}

pub type CompletionCallback = Box<dyn FnMut(&[FinalRating])>;

pub struct VotingSession<S: KeyValueStore> {
    config: SessionConfig,
    user_name: String,
    store: SessionStore<S>,
    rng: StdRng,
    on_complete: Option<CompletionCallback>,

    phase: SessionPhase,
    setup_error: Option<SessionError>,
    /// Visible candidates of the current session.
    candidates: Vec<CandidateItem>,
    /// Ratings supplied by the caller, before any vote of this session.
    seed_ratings: RatingMap,
    /// Key of the candidate set the current order was shuffled for.
    shuffled_for: Option<String>,

    /// Canonical progress: history, counters, order, ratings.
    state: SessionState,
    scheduler: PairScheduler,
    current_match: Option<Matchup>,

    last_vote_at: Option<DateTime<Utc>>,
    transition_until: Option<DateTime<Utc>>,
    round_banner: Option<(u32, DateTime<Utc>)>,
}

impl<S: KeyValueStore> VotingSession<S> {
    pub fn new(user_name: impl Into<String>, backend: S, config: SessionConfig) -> Self {
        Self::with_rng(user_name, backend, config, StdRng::from_os_rng())
    }

    /// Same as `new`, with a seeded shuffle for reproducible pair order.
    pub fn with_seed(user_name: impl Into<String>, backend: S, config: SessionConfig, seed: u64) -> Self {
        Self::with_rng(user_name, backend, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(user_name: impl Into<String>, backend: S, config: SessionConfig, rng: StdRng) -> Self {
        let user_name = user_name.into();
        VotingSession {
            config,
            state: SessionState::fresh(&user_name, ""),
            user_name,
            store: SessionStore::new(backend),
            rng,
            on_complete: None,
            phase: SessionPhase::Uninitialized,
            setup_error: None,
            candidates: Vec::new(),
            seed_ratings: RatingMap::new(),
            shuffled_for: None,
            scheduler: PairScheduler::new(Vec::new()),
            current_match: None,
            last_vote_at: None,
            transition_until: None,
            round_banner: None,
        }
    }

    /// Start, or resume, a session over `candidates`.
    ///
    /// Hidden candidates are dropped. With fewer than two left the session
    /// enters the error phase and every vote/undo is a no-op. A stored record
    /// for the same user and candidate set is resumed instead of starting over.
    pub fn initialize_session(
        &mut self,
        candidates: &[CandidateItem],
        existing_ratings: &RatingMap,
        on_complete: impl FnMut(&[FinalRating]) + 'static,
    ) -> Result<(), SessionError> {
        self.on_complete = Some(Box::new(on_complete));
        self.candidates = candidates.iter().filter(|c| !c.hidden).cloned().collect();
        self.seed_ratings = existing_ratings.clone();
        self.start()
    }

    /// Drop stored progress and start over with the same candidates,
    /// the caller's original ratings and a new shuffle.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        if let Err(err) = self.store.reset() {
            warn!("Failed to clear stored session: {}", err);
        }
        self.shuffled_for = None;
        self.start()
    }

    fn start(&mut self) -> Result<(), SessionError> {
        self.clear_timers();
        self.last_vote_at = None;
        self.current_match = None;

        let key = candidate_set_key(&self.candidates);
        self.store.bind(&self.user_name, &self.candidates);

        if self.candidates.len() < 2 {
            let err = SessionError::NotEnoughCandidates {
                visible: self.candidates.len(),
            };
            warn!("Cannot start session for {}: {}", self.user_name, err);
            self.fail_setup(err.clone(), key);
            return Err(err);
        }
        if let Some(name) = first_duplicate(&self.candidates) {
            let err = SessionError::DuplicateName { name };
            warn!("Cannot start session for {}: {}", self.user_name, err);
            self.fail_setup(err.clone(), key);
            return Err(err);
        }
        self.setup_error = None;

        let names: Vec<String> = self.candidates.iter().map(|c| c.name.clone()).collect();
        let stored = self.store.load();
        let resumed = stored.is_some();
        let mut state = stored.unwrap_or_else(|| SessionState::fresh(&self.user_name, &key));

        let stored_order = std::mem::take(&mut state.item_order);
        state.item_order = if is_permutation(&stored_order, &names) {
            stored_order
        } else if self.shuffled_for.as_deref() == Some(key.as_str())
            && is_permutation(&self.state.item_order, &names)
        {
            // Same candidate set as before: keep the order already on screen.
            self.state.item_order.clone()
        } else {
            let mut order = names.clone();
            order.shuffle(&mut self.rng);
            order
        };
        self.shuffled_for = Some(key);

        let mut ratings = RatingMap::new();
        for name in &names {
            let stored_rating = state.ratings.get(name).copied();
            let seed = self.seed_ratings.get(name).copied();
            let rating = stored_rating.or(seed).unwrap_or_default().normalized();
            ratings.insert(name.clone(), rating);
        }
        state.ratings = ratings;

        self.scheduler = PairScheduler::new(state.item_order.clone());
        self.scheduler.rehydrate(&state.match_history);

        state.total_matches = self.estimate_total_matches(names.len());
        state.current_match = state.match_history.len() as u32 + 1;
        state.current_round = round_for(state.current_match, names.len());
        self.state = state;

        if resumed {
            info!(
                "Resumed session for {} at match {} (round {})",
                self.user_name, self.state.current_match, self.state.current_round
            );
        }

        self.current_match = self.scheduler.next_pair();
        self.phase = if self.current_match.is_none() || self.budget_reached() {
            self.current_match = None;
            SessionPhase::Complete
        } else {
            SessionPhase::Active
        };
        Ok(())
    }

    fn fail_setup(&mut self, err: SessionError, key: String) {
        self.phase = SessionPhase::Error;
        self.setup_error = Some(err);
        self.state = SessionState::fresh(&self.user_name, &key);
        self.scheduler = PairScheduler::new(Vec::new());
        self.shuffled_for = None;
    }

    /// Record the voter's choice for the current pair.
    pub fn vote(&mut self, outcome: VoteOutcome, now: DateTime<Utc>) -> VoteResult {
        self.tick(now);

        match self.phase {
            SessionPhase::Active => {}
            SessionPhase::Transitioning => return VoteResult::Ignored(IgnoreReason::Transitioning),
            _ => return VoteResult::Ignored(IgnoreReason::NotActive),
        }
        if let Some(last) = self.last_vote_at {
            if now - last < self.config.vote_cooldown {
                debug!("Dropping vote inside cooldown window");
                return VoteResult::Ignored(IgnoreReason::Cooldown);
            }
        }
        let Some(matchup) = self.current_match.clone() else {
            return VoteResult::Ignored(IgnoreReason::NotActive);
        };

        let left = self.state.ratings.get(&matchup.left).copied().unwrap_or_default();
        let right = self.state.ratings.get(&matchup.right).copied().unwrap_or_default();
        let update = elo::update(left.rating, right.rating, outcome, &left, &right);
        self.state.ratings.insert(matchup.left.clone(), update.rating_a());
        self.state.ratings.insert(matchup.right.clone(), update.rating_b());

        let (winner, loser) = match outcome {
            VoteOutcome::Left => (Some(matchup.left.clone()), Some(matchup.right.clone())),
            VoteOutcome::Right => (Some(matchup.right.clone()), Some(matchup.left.clone())),
            VoteOutcome::Both | VoteOutcome::Neither => (None, None),
        };
        self.state.match_history.push(MatchRecord {
            matchup: matchup.clone(),
            winner,
            loser,
            vote_type: outcome,
            match_number: self.state.current_match,
            round_number: self.state.current_round,
            timestamp: now,
            ratings_before: vec![
                RatingSnapshot { name: matchup.left.clone(), rating: left },
                RatingSnapshot { name: matchup.right.clone(), rating: right },
            ],
        });
        self.scheduler.record_preference(&matchup.left, &matchup.right, outcome);
        self.last_vote_at = Some(now);

        debug!(
            "Match {}: {} vs {} -> {}",
            self.state.current_match,
            matchup.left,
            matchup.right,
            outcome.as_str()
        );

        self.state.current_match += 1;
        let round = round_for(self.state.current_match, self.candidates.len());
        let round_changed = round != self.state.current_round;
        self.state.current_round = round;

        let next = self.scheduler.next_pair();
        let finished = next.is_none() || self.budget_reached();
        if finished {
            // The final "next match" never happens; keep the round it was in.
            self.round_banner = None;
        } else if round_changed {
            self.round_banner = Some((round, now + self.config.round_banner_duration));
        }

        self.persist(now);

        match next {
            Some(next) if !finished => {
                self.current_match = Some(next.clone());
                self.phase = SessionPhase::Transitioning;
                self.transition_until = Some(now + self.config.transition_delay);
                VoteResult::Next { next, round_changed }
            }
            _ => {
                self.current_match = None;
                self.phase = SessionPhase::Complete;
                self.transition_until = None;
                let finals = self.final_ratings();
                info!(
                    "Session for {} complete after {} matches",
                    self.user_name,
                    self.state.match_history.len()
                );
                if let Some(callback) = self.on_complete.as_mut() {
                    callback(&finals);
                }
                VoteResult::Completed(finals)
            }
        }
    }

    /// Revert the most recent vote: the pair comes back, the scheduler
    /// forgets the preference and both ratings return to their pre-vote values.
    pub fn undo(&mut self, now: DateTime<Utc>) -> UndoResult {
        self.tick(now);

        match self.phase {
            SessionPhase::Active => {}
            SessionPhase::Transitioning => return UndoResult::Ignored(IgnoreReason::Transitioning),
            _ => return UndoResult::Ignored(IgnoreReason::NotActive),
        }
        if !self.scheduler.can_undo() || self.state.match_history.is_empty() {
            return UndoResult::Ignored(IgnoreReason::NothingToUndo);
        }
        let Some(record) = self.state.match_history.pop() else {
            return UndoResult::Ignored(IgnoreReason::NothingToUndo);
        };

        if record.ratings_before.is_empty() {
            debug!("Match {} has no rating snapshot, ratings kept", record.match_number);
        }
        for snapshot in &record.ratings_before {
            self.state.ratings.insert(snapshot.name.clone(), snapshot.rating);
        }
        self.scheduler.undo_last();

        self.state.current_match = record.match_number;
        self.state.current_round = if self.state.match_history.is_empty() {
            1
        } else {
            round_for(record.match_number, self.candidates.len())
        };
        self.round_banner = None;
        self.current_match = Some(record.matchup.clone());

        self.persist(now);
        UndoResult::Reverted(record.matchup)
    }

    /// Advance timers: end an elapsed transition, clear an expired banner.
    /// Returns true when anything visible changed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        if let Some(until) = self.transition_until {
            if now >= until {
                self.end_transition();
                changed = true;
            }
        }
        if let Some((_, until)) = self.round_banner {
            if now >= until {
                self.round_banner = None;
                changed = true;
            }
        }
        changed
    }

    /// End the transition without waiting for its deadline.
    pub fn finish_transition(&mut self) {
        if self.transition_until.is_some() {
            self.end_transition();
        }
    }

    /// Clear pending timers; nothing is left to fire after this.
    pub fn teardown(&mut self) {
        self.clear_timers();
    }

    fn end_transition(&mut self) {
        self.transition_until = None;
        if self.phase == SessionPhase::Transitioning {
            self.phase = SessionPhase::Active;
        }
    }

    fn clear_timers(&mut self) {
        self.end_transition();
        self.round_banner = None;
    }

    fn persist(&mut self, now: DateTime<Utc>) {
        self.store.save(&mut self.state, now);
    }

    fn budget_reached(&self) -> bool {
        self.config
            .max_matches
            .is_some_and(|max| self.state.match_history.len() >= max)
    }

    /// Every pair the scheduler can offer, capped by the match budget.
    fn estimate_total_matches(&self, count: usize) -> u32 {
        let pairs = count * count.saturating_sub(1) / 2;
        let total = match self.config.max_matches {
            Some(max) => pairs.min(max),
            None => pairs,
        };
        total as u32
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn setup_error(&self) -> Option<&SessionError> {
        self.setup_error.as_ref()
    }

    pub fn current_match(&self) -> Option<&Matchup> {
        self.current_match.as_ref()
    }

    /// The pair to render: hidden while a transition runs.
    pub fn visible_match(&self) -> Option<&Matchup> {
        match self.phase {
            SessionPhase::Active => self.current_match.as_ref(),
            _ => None,
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.phase == SessionPhase::Transitioning
    }

    pub fn round_number(&self) -> u32 {
        self.state.current_round
    }

    pub fn current_match_number(&self) -> u32 {
        self.state.current_match
    }

    pub fn total_matches(&self) -> u32 {
        self.state.total_matches
    }

    pub fn can_undo(&self) -> bool {
        self.phase == SessionPhase::Active
            && self.scheduler.can_undo()
            && !self.state.match_history.is_empty()
    }

    pub fn round_banner(&self) -> Option<u32> {
        self.round_banner.map(|(round, _)| round)
    }

    /// Fraction of the estimated total already voted, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.state.total_matches == 0 {
            return if self.phase == SessionPhase::Complete { 1.0 } else { 0.0 };
        }
        (self.state.match_history.len() as f64 / self.state.total_matches as f64).min(1.0)
    }

    pub fn history(&self) -> &[MatchRecord] {
        &self.state.match_history
    }

    pub fn ratings(&self) -> &RatingMap {
        &self.state.ratings
    }

    pub fn item_order(&self) -> &[String] {
        &self.state.item_order
    }

    pub fn scheduler(&self) -> &PairScheduler {
        &self.scheduler
    }

    /// Ratings of this session's names, best first.
    pub fn final_ratings(&self) -> Vec<FinalRating> {
        sorted_final_ratings(&self.state.item_order, &self.state.ratings)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            current_match: self.current_match.clone(),
            is_transitioning: self.is_transitioning(),
            round_number: self.state.current_round,
            current_match_number: self.state.current_match,
            total_matches: self.state.total_matches,
            can_undo: self.can_undo(),
            is_error: self.phase == SessionPhase::Error,
            round_banner: self.round_banner(),
            progress: self.progress(),
        }
    }

    pub fn store(&self) -> &SessionStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SessionStore<S> {
        &mut self.store
    }
}

/// Names identify candidates inside a session, so each must be unique.
fn first_duplicate(candidates: &[CandidateItem]) -> Option<String> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .find(|c| !seen.insert(c.name.as_str()))
        .map(|c| c.name.clone())
}

/// `ceil(match_number / ceil(n / 2))`, never below 1.
pub fn round_for(match_number: u32, candidate_count: usize) -> u32 {
    let per_round = (candidate_count as u32).div_ceil(2).max(1);
    match_number.div_ceil(per_round).max(1)
}

fn is_permutation(order: &[String], names: &[String]) -> bool {
    if order.len() != names.len() {
        return false;
    }
    let mut a: Vec<&String> = order.iter().collect();
    let mut b: Vec<&String> = names.iter().collect();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}
