/// Position-based rating normalization for manual re-ordering.
///
/// Independent of the voting loop: when a user drags names into an order,
/// each name's rating is pulled toward a rating derived from its position,
/// more strongly the more comparisons have already been played.
use crate::constants::{BLEND_RATING_MAX, BLEND_RATING_MIN, BLEND_SLOPE, MAX_BLEND_FACTOR};
use crate::types::{Rating, RatingMap};

/// Blend `existing_rating` with `position_rating`.
///
/// Matches played beyond the budget saturate. The position weight is capped
/// at 80% so the existing rating always keeps some influence.
pub fn blend_rating(
    matches_played: usize,
    max_matches: usize,
    position_rating: f64,
    existing_rating: f64,
) -> f64 {
    let safe_max = max_matches.max(1);
    let clamped = matches_played.min(safe_max);
    let blend_factor = (clamped as f64 / safe_max as f64 * BLEND_SLOPE).min(MAX_BLEND_FACTOR);

    let blended = blend_factor * position_rating + (1.0 - blend_factor) * existing_rating;
    let rounded = blended.round();
    if rounded.is_nan() {
        // Only reachable with infinite inputs of opposite sign.
        return BLEND_RATING_MIN;
    }
    rounded.clamp(BLEND_RATING_MIN, BLEND_RATING_MAX)
}

/// Rating implied by a 0-based `position` in a list of `count` names.
/// The top of the list maps to the upper blend bound, the bottom to the lower.
pub fn position_rating(position: usize, count: usize) -> f64 {
    if count < 2 {
        return (BLEND_RATING_MIN + BLEND_RATING_MAX) / 2.0;
    }
    let position = position.min(count - 1);
    let span = BLEND_RATING_MAX - BLEND_RATING_MIN;
    BLEND_RATING_MAX - span * position as f64 / (count - 1) as f64
}

/// Apply a manual ordering to `ratings`, blending every listed name.
///
/// Names missing from `ratings` start from the default rating. Win/loss
/// counters are left untouched.
pub fn apply_manual_order(
    order: &[String],
    ratings: &RatingMap,
    matches_played: usize,
    max_matches: usize,
) -> RatingMap {
    let mut out = ratings.clone();
    for (position, name) in order.iter().enumerate() {
        let current = ratings.get(name).copied().unwrap_or_default().normalized();
        let blended = blend_rating(
            matches_played,
            max_matches,
            position_rating(position, order.len()),
            current.rating,
        );
        out.insert(name.clone(), Rating { rating: blended, ..current });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_blend_half_budget() {
        assert_eq!(blend_rating(5, 10, 1600.0, 1400.0), 1490.0);
    }

    #[test]
    fn test_blend_factor_capped() {
        // Full budget: factor would be 0.9, capped at 0.8.
        assert_eq!(blend_rating(10, 10, 2000.0, 1000.0), 1800.0);
        // Far past the budget saturates the same way.
        assert_eq!(blend_rating(10_000, 10, 2000.0, 1000.0), 1800.0);
    }

    #[test]
    fn test_blend_zero_budget() {
        // max(1, 0) = 1, no matches played → existing rating only.
        assert_eq!(blend_rating(0, 0, 1900.0, 1300.0), 1300.0);
    }

    #[test]
    fn test_position_rating_endpoints() {
        assert_eq!(position_rating(0, 5), 2000.0);
        assert_eq!(position_rating(4, 5), 1000.0);
        assert_eq!(position_rating(2, 5), 1500.0);
        assert_eq!(position_rating(0, 1), 1500.0);
    }

    #[test]
    fn test_apply_manual_order_keeps_counters() {
        let mut ratings = RatingMap::new();
        ratings.insert("Luna".into(), Rating::new(1400.0, 3, 1));
        let order = vec!["Luna".to_string(), "Milo".to_string()];

        let out = apply_manual_order(&order, &ratings, 10, 10);
        let luna = out["Luna"];
        assert_eq!(luna.wins, 3);
        assert_eq!(luna.losses, 1);
        assert!(luna.rating > 1400.0);
        assert!(out["Milo"].rating < 1500.0);
    }

    proptest! {
        #[test]
        fn test_blend_always_in_bounds(
            played in 0usize..100_000,
            max in 0usize..1_000,
            position in -1.0e9f64..1.0e9,
            existing in -1.0e9f64..1.0e9,
        ) {
            let r = blend_rating(played, max, position, existing);
            prop_assert!((1000.0..=2000.0).contains(&r));
        }
    }
}
