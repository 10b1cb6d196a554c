//! Timestamp value object for immutable points in time.
//!
//! The current instant always comes from an injected [`Clock`](crate::ports::Clock).

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Returns the duration from another timestamp to this one.
    ///
    /// Returns negative duration if other is after self.
    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        self.0.signed_duration_since(other.0)
    }

    /// Creates a new timestamp by adding the specified number of days.
    ///
    /// Negative values subtract days.
    pub fn add_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    /// Creates a new timestamp by adding the specified number of seconds.
    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0 + Duration::seconds(secs as i64))
    }

    /// Creates a timestamp from Unix seconds.
    ///
    /// Returns `None` for values outside chrono's representable range.
    pub fn from_unix_secs(secs: i64) -> Option<Self> {
        Utc.timestamp_opt(secs, 0).single().map(Self)
    }

    /// Returns the timestamp as Unix seconds.
    pub fn as_unix_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Whole UTC calendar days from `self` (inclusive) to `other` (exclusive).
    ///
    /// Never negative.
    pub fn calendar_days_until(&self, other: &Timestamp) -> u32 {
        if other.0 <= self.0 {
            return 0;
        }
        let days = (other.0.date_naive() - self.0.date_naive()).num_days();
        u32::try_from(days).unwrap_or(u32::MAX)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn at(rfc3339: &str) -> Timestamp {
        Timestamp::from_datetime(
            DateTime::parse_from_rfc3339(rfc3339)
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    #[test]
    fn timestamp_ordering_works() {
        let ts1 = at("2024-01-15T10:30:00Z");
        let ts2 = at("2024-01-15T10:30:01Z");
        assert!(ts1 < ts2);
        assert!(ts1.is_before(&ts2));
        assert!(ts2.is_after(&ts1));
    }

    #[test]
    fn timestamp_serializes_to_json() {
        let json = serde_json::to_string(&at("2024-01-15T10:30:00Z")).unwrap();
        assert!(json.contains("2024-01-15"));
    }

    #[test]
    fn timestamp_deserializes_from_json() {
        let ts: Timestamp = serde_json::from_str("\"2024-01-15T10:30:00Z\"").unwrap();
        assert_eq!(ts.as_datetime().year(), 2024);
    }

    #[test]
    fn add_days_moves_forward_and_back() {
        let ts = at("2024-03-01T00:00:00Z");
        assert_eq!(ts.add_days(30), at("2024-03-31T00:00:00Z"));
        assert_eq!(ts.add_days(-1), at("2024-02-29T00:00:00Z"));
    }

    #[test]
    fn unix_secs_roundtrip() {
        let ts = Timestamp::from_unix_secs(1705276800).unwrap();
        assert_eq!(ts.as_unix_secs(), 1705276800);
        assert_eq!(ts.plus_secs(60).as_unix_secs(), 1705276860);
    }

    #[test]
    fn calendar_days_counts_date_boundaries() {
        let start = at("2024-01-01T15:00:00Z");
        let change = at("2024-01-11T09:00:00Z");
        assert_eq!(start.calendar_days_until(&change), 10);
    }

    #[test]
    fn calendar_days_clamps_to_zero_when_reversed() {
        let a = at("2024-01-10T00:00:00Z");
        let b = at("2024-01-01T00:00:00Z");
        assert_eq!(a.calendar_days_until(&b), 0);
        assert_eq!(a.calendar_days_until(&a), 0);
    }
}
