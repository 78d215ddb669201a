use thiserror::Error;

/// Why a session cannot start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("need at least 2 visible candidates to start voting, got {visible}")]
    NotEnoughCandidates { visible: usize },

    #[error("candidate name {name:?} appears more than once")]
    DuplicateName { name: String },
}

/// Failure reported by a `KeyValueStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
