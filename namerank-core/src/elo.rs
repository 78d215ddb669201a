/// Elo-style rating update for a single pairwise vote.
///
/// Pure function without state. The caller applies and persists the result.
use crate::constants::{
    EXPORT_RATING_MAX, EXPORT_RATING_MIN, K_FACTOR, PROVISIONAL_GAMES_THRESHOLD, RATING_DIVISOR,
};
use crate::types::{Rating, VoteOutcome};

/// Result of one update: new ratings and counters for both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EloUpdate {
    pub new_rating_a: f64,
    pub new_rating_b: f64,
    pub wins_a: u32,
    pub losses_a: u32,
    pub wins_b: u32,
    pub losses_b: u32,
}

impl EloUpdate {
    pub fn rating_a(&self) -> Rating {
        Rating::new(self.new_rating_a, self.wins_a, self.losses_a)
    }

    pub fn rating_b(&self) -> Rating {
        Rating::new(self.new_rating_b, self.wins_b, self.losses_b)
    }
}

/// Probability that a player rated `rating` beats one rated `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / RATING_DIVISOR))
}

/// K-factor for a player with `games_played` decided games.
pub fn k_factor(games_played: u32) -> f64 {
    if games_played < PROVISIONAL_GAMES_THRESHOLD {
        K_FACTOR * 2.0
    } else {
        K_FACTOR
    }
}

/// Compute new ratings after A (left) and B (right) meet with `outcome`.
///
/// Only the win/loss counters of `stats_a`/`stats_b` are read; their
/// `rating` field is ignored in favour of `rating_a`/`rating_b`.
pub fn update(
    rating_a: f64,
    rating_b: f64,
    outcome: VoteOutcome,
    stats_a: &Rating,
    stats_b: &Rating,
) -> EloUpdate {
    let (actual_a, actual_b) = outcome.scores();
    let expected_a = expected_score(rating_a, rating_b);
    let expected_b = expected_score(rating_b, rating_a);

    let k_a = k_factor(stats_a.games_played());
    let k_b = k_factor(stats_b.games_played());

    EloUpdate {
        new_rating_a: (rating_a + k_a * (actual_a - expected_a)).round(),
        new_rating_b: (rating_b + k_b * (actual_b - expected_b)).round(),
        wins_a: stats_a.wins + u32::from(actual_a == 1.0),
        losses_a: stats_a.losses + u32::from(actual_a == 0.0),
        wins_b: stats_b.wins + u32::from(actual_b == 1.0),
        losses_b: stats_b.losses + u32::from(actual_b == 0.0),
    }
}

/// Clamp a rating into the range accepted by save and export paths.
pub fn clamp_for_export(rating: f64) -> f64 {
    rating.clamp(EXPORT_RATING_MIN, EXPORT_RATING_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fresh() -> Rating {
        Rating::default()
    }

    fn veteran() -> Rating {
        Rating::new(1500.0, 20, 20)
    }

    #[test]
    fn test_expected_score_even() {
        assert!((expected_score(1500.0, 1500.0) - 0.5).abs() < 1e-12);
        assert!(expected_score(1900.0, 1500.0) > 0.9);
    }

    #[test]
    fn test_left_win_equal_ratings() {
        let u = update(1500.0, 1500.0, VoteOutcome::Left, &fresh(), &fresh());
        // Provisional K = 64, expected 0.5 → ±32.
        assert_eq!(u.new_rating_a, 1532.0);
        assert_eq!(u.new_rating_b, 1468.0);
        assert_eq!((u.wins_a, u.losses_a, u.wins_b, u.losses_b), (1, 0, 0, 1));
    }

    #[test]
    fn test_veteran_uses_base_k() {
        let u = update(1500.0, 1500.0, VoteOutcome::Right, &veteran(), &veteran());
        assert_eq!(u.new_rating_a, 1484.0);
        assert_eq!(u.new_rating_b, 1516.0);
    }

    #[test]
    fn test_draw_moves_toward_midpoint() {
        for outcome in [VoteOutcome::Both, VoteOutcome::Neither] {
            let u = update(1600.0, 1400.0, outcome, &fresh(), &fresh());
            assert!(u.new_rating_a < 1600.0);
            assert!(u.new_rating_b > 1400.0);
            assert_eq!((u.wins_a, u.losses_a, u.wins_b, u.losses_b), (0, 0, 0, 0));
        }
    }

    #[test]
    fn test_clamp_for_export() {
        assert_eq!(clamp_for_export(300.0), 800.0);
        assert_eq!(clamp_for_export(2999.0), 2400.0);
        assert_eq!(clamp_for_export(1555.0), 1555.0);
    }

    proptest! {
        #[test]
        fn test_relabeling_symmetry(
            ra in 800.0f64..2400.0,
            rb in 800.0f64..2400.0,
            wins in 0u32..40,
            losses in 0u32..40,
        ) {
            let stats = Rating::new(1500.0, wins, losses);
            let forward = update(ra, rb, VoteOutcome::Left, &stats, &stats);
            let mirrored = update(rb, ra, VoteOutcome::Right, &stats, &stats);
            prop_assert_eq!(forward.new_rating_a, mirrored.new_rating_b);
            prop_assert_eq!(forward.new_rating_b, mirrored.new_rating_a);
        }

        #[test]
        fn test_winner_gains_when_even(r in 800.0f64..2400.0, games in 0u32..60) {
            let stats = Rating::new(r, games, 0);
            let u = update(r, r, VoteOutcome::Left, &stats, &stats);
            prop_assert!(u.new_rating_a > r);
            prop_assert!(u.new_rating_b < r);
        }
    }
}
