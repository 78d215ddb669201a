/// namerank-core: Pairwise name ranking engine.
///
/// Exhaustive pair scheduling → Elo updates per vote → resumable voting
/// session with single-step undo. The core never touches the filesystem, network or clock:
/// the caller passes `now` in and supplies the key-value backend.
///
/// Names are identified by their `name` string inside a session; candidate
/// `id`s only scope the persisted record.
///
/// # Quick start
///
/// ```rust
/// use chrono::Utc;
/// use namerank_core::{
///     CandidateItem, MemoryStore, RatingMap, SessionConfig, VoteOutcome, VoteResult,
///     VotingSession,
/// };
///
/// let candidates: Vec<CandidateItem> =
///     ["Luna", "Oliver", "Milo"].into_iter().map(CandidateItem::new).collect();
///
/// let mut session = VotingSession::new("ana", MemoryStore::new(), SessionConfig::default());
/// session
///     .initialize_session(&candidates, &RatingMap::new(), |finals| {
///         for f in finals {
///             println!("{}: {}", f.name, f.rating);
///         }
///     })
///     .unwrap();
///
/// loop {
///     session.finish_transition();
///     match session.vote(VoteOutcome::Left, Utc::now()) {
///         VoteResult::Completed(_) => break,
///         _ => std::thread::sleep(std::time::Duration::from_millis(350)),
///     }
/// }
/// ```

pub mod blend;
pub mod constants;
pub mod elo;
pub mod engine;
pub mod error;
pub mod pairing;
pub mod store;
pub mod types;

// Re-export primary public API at crate root.
pub use blend::{apply_manual_order, blend_rating, position_rating};
pub use elo::{clamp_for_export, expected_score, update as update_ratings, EloUpdate};
pub use engine::{
    round_for, IgnoreReason, SessionConfig, SessionPhase, SessionSnapshot, UndoResult,
    VoteResult, VotingSession,
};
pub use error::{SessionError, StoreError};
pub use pairing::PairScheduler;
pub use store::{
    candidate_set_key, storage_key, KeyValueStore, MemoryStore, SessionState, SessionStore,
};
pub use types::{
    sorted_final_ratings, CandidateItem, FinalRating, MatchRecord, Matchup, Preference, Rating,
    RatingMap, RatingSnapshot, VoteOutcome,
};
