//! Inclusive time ranges for record queries.

use std::fmt;

use chrono::DateTime;

use crate::error::DataError;

/// Renders epoch milliseconds as an RFC 3339 UTC timestamp.
pub fn format_time(time: i64) -> String {
    match DateTime::from_timestamp_millis(time) {
        Some(dt) => dt.to_rfc3339(),
        None => time.to_string(),
    }
}

/// `time + delta`, rejecting results outside the `i64` range.
pub(crate) fn shift_time(time: i64, delta: i64) -> Result<i64, DataError> {
    time.checked_add(delta)
        .ok_or(DataError::TimeOverflow { time, delta })
}

/// A named time range, inclusive at both ends, in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    start: i64,
    end: i64,
    name: String,
}

impl Interval {
    pub fn new(start: i64, end: i64) -> Result<Self, DataError> {
        Self::named(start, end, "")
    }

    pub fn named(start: i64, end: i64, name: impl Into<String>) -> Result<Self, DataError> {
        if end < start {
            return Err(DataError::InvalidTimeRange { start, end });
        }
        Ok(Self {
            start,
            end,
            name: name.into(),
        })
    }

    /// Spans every representable time.
    pub fn all() -> Self {
        Self {
            start: i64::MIN,
            end: i64::MAX,
            name: String::new(),
        }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, time: i64) -> bool {
        self.start <= time && time <= self.end
    }

    pub fn duration_ms(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.name.is_empty() {
            write!(f, "{}: ", self.name)?;
        }
        write!(f, "{} - {}", format_time(self.start), format_time(self.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_inclusive() {
        let i = Interval::new(1000, 2000).unwrap();
        assert!(i.contains(1000));
        assert!(i.contains(2000));
        assert!(!i.contains(999));
        assert!(!i.contains(2001));
        assert_eq!(i.duration_ms(), 1000);
    }

    #[test]
    fn test_reversed_bounds_rejected() {
        assert_eq!(
            Interval::new(2000, 1000),
            Err(DataError::InvalidTimeRange {
                start: 2000,
                end: 1000
            })
        );
    }

    #[test]
    fn test_display() {
        let i = Interval::named(0, 60_000, "first minute").unwrap();
        assert_eq!(
            i.to_string(),
            "first minute: 1970-01-01T00:00:00+00:00 - 1970-01-01T00:01:00+00:00"
        );
    }

    #[test]
    fn test_all_contains_extremes() {
        let all = Interval::all();
        assert!(all.contains(i64::MIN));
        assert!(all.contains(i64::MAX));
    }
}
