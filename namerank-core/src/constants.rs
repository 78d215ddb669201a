/// Rating assigned to a name that has never been voted on.
pub const DEFAULT_RATING: f64 = 1500.0;

/// Scale of the Elo logistic curve: a gap of this many points means
/// the stronger name is expected to win ten times out of eleven.
pub const RATING_DIVISOR: f64 = 400.0;

/// Base K-factor applied to every Elo update.
pub const K_FACTOR: f64 = 32.0;

/// Names with fewer games than this get a doubled K-factor so a fresh
/// candidate finds its level in a handful of votes.
pub const PROVISIONAL_GAMES_THRESHOLD: u32 = 15;

/// Bounds applied when ratings leave the engine (export, remote save).
/// The updater itself never clamps.
pub const EXPORT_RATING_MIN: f64 = 800.0;
pub const EXPORT_RATING_MAX: f64 = 2400.0;

/// Bounds of a blended (manually ordered) rating.
pub const BLEND_RATING_MIN: f64 = 1000.0;
pub const BLEND_RATING_MAX: f64 = 2000.0;

/// Maximum weight the position-derived rating can reach when blending.
pub const MAX_BLEND_FACTOR: f64 = 0.8;

/// Growth rate of the blend factor per fraction of the match budget played.
pub const BLEND_SLOPE: f64 = 0.9;

/// Minimum interval between two accepted votes, in milliseconds.
/// Absorbs double taps and key repeat.
pub const VOTE_COOLDOWN_MS: i64 = 300;

/// How long the next pair stays hidden after a vote, in milliseconds.
pub const TRANSITION_DELAY_MS: i64 = 500;

/// How long the "Round N" banner stays up after a round change, in milliseconds.
pub const ROUND_BANNER_MS: i64 = 2000;

/// Prefix of every persisted session key.
pub const SESSION_KEY_PREFIX: &str = "tournament";
