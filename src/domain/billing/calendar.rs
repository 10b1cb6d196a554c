//! Calendar helpers for billing periods.

use crate::domain::foundation::Timestamp;

/// UTC calendar days from `start` (inclusive) to `end` (exclusive).
///
/// Returns 0 when `end <= start`.
pub fn days_between(start: Timestamp, end: Timestamp) -> u32 {
    start.calendar_days_until(&end)
}

/// End of a billing period of `period_days` starting at `start`.
pub fn period_end(start: Timestamp, period_days: u32) -> Timestamp {
    start.add_days(i64::from(period_days))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_day_period_counts_thirty_days() {
        let start = Timestamp::from_unix_secs(1_704_067_200).unwrap(); // 2024-01-01
        assert_eq!(days_between(start, period_end(start, 30)), 30);
    }

    #[test]
    fn reversed_range_is_zero() {
        let start = Timestamp::from_unix_secs(1_704_067_200).unwrap();
        assert_eq!(days_between(start.add_days(5), start), 0);
    }

    #[test]
    fn same_day_instants_count_zero_days() {
        let morning = Timestamp::from_unix_secs(1_704_067_200 + 3_600).unwrap();
        let evening = Timestamp::from_unix_secs(1_704_067_200 + 20 * 3_600).unwrap();
        assert_eq!(days_between(morning, evening), 0);
    }
}
