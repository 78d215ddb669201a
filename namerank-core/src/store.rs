/// Durable session progress.
///
/// The record is scoped to a user and a candidate set. Anything that does not
/// decode, or belongs to a different scope, is treated as absent: a fresh
/// session starts instead of an error reaching the voter.
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::SESSION_KEY_PREFIX;
use crate::error::StoreError;
use crate::types::{CandidateItem, MatchRecord, RatingMap};

/// Bumped when the persisted shape changes incompatibly.
pub const SESSION_STATE_VERSION: u32 = 1;

/// Raw key-value cell. Implementations decide where bytes live.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// In-process store. Useful for tests and for callers that persist elsewhere.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Persisted progress of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default = "current_version")]
    pub version: u32,
    pub match_history: Vec<MatchRecord>,
    #[serde(default = "one")]
    pub current_round: u32,
    #[serde(default = "one")]
    pub current_match: u32,
    #[serde(default)]
    pub total_matches: u32,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub candidate_set_key: String,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Shuffled candidate order, so a resumed session offers the same pairs.
    #[serde(default)]
    pub item_order: Vec<String>,
    /// In-session ratings at the time of the last write.
    #[serde(default)]
    pub ratings: RatingMap,
}

fn current_version() -> u32 {
    SESSION_STATE_VERSION
}

fn one() -> u32 {
    1
}

impl SessionState {
    /// Round 1, match 1, empty history.
    pub fn fresh(user_name: &str, candidate_set_key: &str) -> Self {
        SessionState {
            version: SESSION_STATE_VERSION,
            match_history: Vec::new(),
            current_round: 1,
            current_match: 1,
            total_matches: 0,
            user_name: user_name.to_string(),
            candidate_set_key: candidate_set_key.to_string(),
            last_updated: None,
            item_order: Vec::new(),
            ratings: RatingMap::new(),
        }
    }
}

/// Join sorted parts with `,`, escaping backslashes and commas inside each
/// part so that different sets never produce the same string.
fn join_sorted<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut parts: Vec<&str> = parts.collect();
    parts.sort_unstable();
    parts
        .iter()
        .map(|p| p.replace('\\', "\\\\").replace(',', "\\,"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Sorted identities of the candidate set, joined by `,`.
/// Reordering the same candidates yields the same key.
pub fn candidate_set_key(candidates: &[CandidateItem]) -> String {
    join_sorted(candidates.iter().map(CandidateItem::identity))
}

/// `tournament-<user>-<sorted names>`.
pub fn storage_key(user_name: &str, candidates: &[CandidateItem]) -> String {
    format!(
        "{SESSION_KEY_PREFIX}-{user_name}-{}",
        join_sorted(candidates.iter().map(|c| c.name.as_str()))
    )
}

#[derive(Debug, Clone)]
struct Scope {
    key: String,
    user_name: String,
    candidate_set_key: String,
    names: HashSet<String>,
}

/// Typed view of one session record over a `KeyValueStore`.
pub struct SessionStore<S: KeyValueStore> {
    backend: S,
    scope: Option<Scope>,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(backend: S) -> Self {
        SessionStore {
            backend,
            scope: None,
        }
    }

    /// Point the store at the record for `user_name` and `candidates`.
    pub fn bind(&mut self, user_name: &str, candidates: &[CandidateItem]) {
        self.scope = Some(Scope {
            key: storage_key(user_name, candidates),
            user_name: user_name.to_string(),
            candidate_set_key: candidate_set_key(candidates),
            names: candidates.iter().map(|c| c.name.clone()).collect(),
        });
    }

    pub fn key(&self) -> Option<&str> {
        self.scope.as_ref().map(|s| s.key.as_str())
    }

    /// The stored record for the bound scope, if one exists and is usable.
    pub fn load(&self) -> Option<SessionState> {
        let scope = self.scope.as_ref()?;
        let raw = self.backend.get(&scope.key)?;

        let state: SessionState = match serde_json::from_value(raw) {
            Ok(state) => state,
            Err(err) => {
                warn!("Discarding malformed session record {}: {}", scope.key, err);
                return None;
            }
        };

        if state.version > SESSION_STATE_VERSION {
            warn!(
                "Discarding session record {} with unknown version {}",
                scope.key, state.version
            );
            return None;
        }

        if state.user_name != scope.user_name || state.candidate_set_key != scope.candidate_set_key {
            debug!("Session record {} belongs to another scope, starting fresh", scope.key);
            return None;
        }

        let foreign = state.match_history.iter().find(|r| {
            !scope.names.contains(&r.matchup.left) || !scope.names.contains(&r.matchup.right)
        });
        if let Some(record) = foreign {
            warn!(
                "Discarding session record {}: match {} names a candidate outside the set",
                scope.key, record.match_number
            );
            return None;
        }

        Some(state)
    }

    /// The stored record, or a fresh one when absent or unusable.
    pub fn load_or_fresh(&self) -> SessionState {
        self.load().unwrap_or_else(|| match &self.scope {
            Some(scope) => SessionState::fresh(&scope.user_name, &scope.candidate_set_key),
            None => SessionState::fresh("", ""),
        })
    }

    /// Write `state`, stamping `last_updated` and the bound user.
    ///
    /// A backend failure is logged and swallowed; returns whether it was written.
    pub fn save(&mut self, state: &mut SessionState, now: DateTime<Utc>) -> bool {
        let Some(scope) = self.scope.as_ref() else {
            debug!("Session store not bound, skipping write");
            return false;
        };

        state.last_updated = Some(now);
        state.user_name = scope.user_name.clone();
        state.candidate_set_key = scope.candidate_set_key.clone();
        state.version = SESSION_STATE_VERSION;

        let value = match serde_json::to_value(&*state) {
            Ok(value) => value,
            Err(err) => {
                warn!("Failed to encode session {}: {}", scope.key, err);
                return false;
            }
        };

        match self.backend.set(&scope.key, value) {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to persist session {}: {}", scope.key, err);
                false
            }
        }
    }

    /// Explicit reset: drop the stored record for the bound scope.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        match &self.scope {
            Some(scope) => self.backend.remove(&scope.key),
            None => Ok(()),
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }

    pub fn into_backend(self) -> S {
        self.backend
    }
}
