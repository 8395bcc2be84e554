//! Achievement percentages derived from key result values.
//!
//! A key result reports `round(current / goal * 100)` clamped to `0..=100`;
//! over-achievement stays visible in `current_value`, never in the percentage.
//! An objective reports the mean of its key results.

use super::error::{OkrError, OkrResult};

pub const MIN_ACHIEVEMENT: i32 = 0;
pub const MAX_ACHIEVEMENT: i32 = 100;

pub fn achievement(current_value: f64, goal_value: f64) -> OkrResult<i32> {
    if !goal_value.is_finite() || goal_value <= 0.0 {
        return Err(OkrError::InvalidGoal(goal_value));
    }
    if !current_value.is_finite() {
        return Err(OkrError::validation("current value must be a finite number"));
    }
    let percentage = (current_value / goal_value * 100.0).round();
    Ok(percentage.clamp(MIN_ACHIEVEMENT as f64, MAX_ACHIEVEMENT as f64) as i32)
}

/// Mean of key result achievements, rounded half away from zero. No key results yields 0.
pub fn objective_achievement<I>(key_result_achievements: I) -> i32
where
    I: IntoIterator<Item = i32>,
{
    let (sum, count) = key_result_achievements
        .into_iter()
        .fold((0i64, 0i64), |(sum, count), a| (sum + i64::from(a), count + 1));
    if count == 0 {
        return MIN_ACHIEVEMENT;
    }
    (sum as f64 / count as f64).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_reached_is_full_achievement() {
        for goal in [1.0, 3.0, 7.5, 100.0, 12_345.0] {
            assert_eq!(achievement(goal, goal).unwrap(), 100);
        }
    }

    #[test]
    fn test_achievement_is_bounded() {
        let cases = [(-50.0, 10.0), (0.0, 10.0), (3.0, 10.0), (10.0, 10.0), (250.0, 10.0)];
        for (current, goal) in cases {
            let a = achievement(current, goal).unwrap();
            assert!((0..=100).contains(&a), "{current}/{goal} gave {a}");
        }
        assert_eq!(achievement(-50.0, 10.0).unwrap(), 0);
        assert_eq!(achievement(250.0, 10.0).unwrap(), 100);
    }

    #[test]
    fn test_achievement_rounds() {
        assert_eq!(achievement(1.0, 3.0).unwrap(), 33);
        assert_eq!(achievement(2.0, 3.0).unwrap(), 67);
        assert_eq!(achievement(50.0, 100.0).unwrap(), 50);
    }

    #[test]
    fn test_non_positive_goal_is_rejected() {
        for goal in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            match achievement(1.0, goal) {
                Err(OkrError::InvalidGoal(_)) => {}
                other => panic!("goal {goal} should be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_non_finite_current_is_rejected() {
        assert!(matches!(
            achievement(f64::NAN, 10.0),
            Err(OkrError::Validation(_))
        ));
    }

    #[test]
    fn test_objective_mean() {
        assert_eq!(objective_achievement([50, 100]), 75);
        assert_eq!(objective_achievement([0, 0, 1]), 0);
        assert_eq!(objective_achievement([33, 34]), 34);
        assert_eq!(objective_achievement(Vec::new()), 0);
    }
}
