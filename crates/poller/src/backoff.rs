//! Steady-state polling backoff.

use std::time::Duration;

/// Interval before the next steady-state poll:
/// `min(base * multiplier^(attempt / attempts_per_tier), max)`.
///
/// The tier division means the interval holds for `attempts_per_tier` polls
/// before growing, so short tasks are polled briskly and long tasks back off.
pub fn steady_interval(
    base: Duration,
    multiplier: f64,
    attempts_per_tier: u32,
    max: Duration,
    attempt: u32,
) -> Duration {
    let tier = attempt / attempts_per_tier.max(1);
    let scaled = base.as_millis() as f64 * multiplier.powi(tier as i32);
    let capped = scaled.min(max.as_millis() as f64).max(0.0);
    Duration::from_millis(capped as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn holds_within_tier_then_doubles() {
        let base = Duration::from_millis(1000);
        let max = Duration::from_secs(60);
        for attempt in 0..5 {
            assert_eq!(steady_interval(base, 2.0, 5, max, attempt), base);
        }
        for attempt in 5..10 {
            assert_eq!(
                steady_interval(base, 2.0, 5, max, attempt),
                Duration::from_millis(2000)
            );
        }
        assert_eq!(
            steady_interval(base, 2.0, 5, max, 10),
            Duration::from_millis(4000)
        );
    }

    #[test]
    fn capped_at_max() {
        let base = Duration::from_millis(1000);
        let max = Duration::from_millis(5000);
        assert_eq!(steady_interval(base, 2.0, 5, max, 100), max);
    }

    #[test]
    fn zero_tier_size_does_not_divide_by_zero() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(10);
        let _ = steady_interval(base, 2.0, 0, max, 7);
    }

    proptest! {
        #[test]
        fn non_decreasing_and_bounded(
            base_ms in 10u64..5_000,
            multiplier in 1.0f64..4.0,
            tier in 1u32..10,
            max_ms in 5_000u64..120_000,
            attempt in 0u32..500,
        ) {
            let base = Duration::from_millis(base_ms);
            let max = Duration::from_millis(max_ms);

            let here = steady_interval(base, multiplier, tier, max, attempt);
            let next = steady_interval(base, multiplier, tier, max, attempt + 1);

            prop_assert!(next >= here);
            prop_assert!(here <= max.max(base));
            prop_assert!(here >= Duration::ZERO);
        }

        #[test]
        fn matches_formula(
            base_ms in 10u64..5_000,
            tier in 1u32..10,
            attempt in 0u32..100,
        ) {
            let base = Duration::from_millis(base_ms);
            let max = Duration::from_secs(3600);
            let expected = (base_ms as f64 * 2.0f64.powi((attempt / tier) as i32))
                .min(max.as_millis() as f64) as u64;
            prop_assert_eq!(
                steady_interval(base, 2.0, tier, max, attempt),
                Duration::from_millis(expected)
            );
        }
    }
}
