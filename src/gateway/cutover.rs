//! Cutover clock and processing cursor.
//!
//! The cutover boundary is fixed once at start-up. Nothing at or before it is
//! ever processed, so a restart never replays chat history.

use chrono::{DateTime, Local, TimeDelta, Utc};
use parley_core::error::ParleyError;
use std::time::Duration;

/// Store-native textual timestamp: local time with an explicit `±HH:MM` offset.
const STORE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Render a point in time the way the message store serialises it.
pub fn format_store_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format(STORE_TIMESTAMP_FORMAT)
        .to_string()
}

/// One-shot anti-replay boundary.
#[derive(Debug, Clone, Copy)]
pub struct CutoverClock {
    boundary: DateTime<Utc>,
}

impl CutoverClock {
    /// Fix the boundary at `now + grace`.
    pub fn initialize(grace: Duration) -> Result<Self, ParleyError> {
        Self::initialize_at(Utc::now(), grace)
    }

    /// Fix the boundary at `now + grace` for an explicit `now`.
    pub fn initialize_at(now: DateTime<Utc>, grace: Duration) -> Result<Self, ParleyError> {
        let grace = TimeDelta::from_std(grace)
            .map_err(|e| ParleyError::Config(format!("cutover grace out of range: {e}")))?;
        let boundary = now
            .checked_add_signed(grace)
            .ok_or_else(|| ParleyError::Config("cutover boundary overflows".into()))?;
        Ok(Self { boundary })
    }

    pub fn boundary(&self) -> DateTime<Utc> {
        self.boundary
    }

    /// The boundary in the store's local-time representation.
    pub fn boundary_string(&self) -> String {
        format_store_timestamp(self.boundary())
    }

    /// Whether a row is eligible at all.
    pub fn is_after_cutover(&self, ts: DateTime<Utc>) -> bool {
        ts > self.boundary()
    }

    /// Initial cursor positioned at the boundary.
    pub fn cursor(&self) -> ProcessingCursor {
        ProcessingCursor {
            last_processed: self.boundary,
        }
    }
}

/// Timestamp of the last examined row. Never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingCursor {
    last_processed: DateTime<Utc>,
}

impl ProcessingCursor {
    pub fn last_processed(&self) -> DateTime<Utc> {
        self.last_processed
    }

    /// Move forward to `ts`; earlier timestamps leave the cursor unchanged.
    pub fn advance(&mut self, ts: DateTime<Utc>) {
        if ts > self.last_processed {
            self.last_processed = ts;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_boundary_includes_grace() {
        let clock = CutoverClock::initialize_at(noon(), Duration::from_secs(10)).unwrap();
        assert_eq!(clock.boundary(), noon() + TimeDelta::seconds(10));
        assert_eq!(clock.cursor().last_processed(), clock.boundary());
    }

    #[test]
    fn test_cutover_is_strict() {
        let clock = CutoverClock::initialize_at(noon(), Duration::from_secs(10)).unwrap();
        assert!(!clock.is_after_cutover(noon()));
        assert!(!clock.is_after_cutover(clock.boundary()));
        assert!(clock.is_after_cutover(clock.boundary() + TimeDelta::milliseconds(1)));
    }

    #[test]
    fn test_boundary_string_has_offset_and_round_trips() {
        let clock = CutoverClock::initialize_at(noon(), Duration::from_millis(1500)).unwrap();
        let s = clock.boundary_string();
        // ...T12:00:01.500+HH:MM or -HH:MM
        let suffix = &s[s.len() - 6..];
        assert!(suffix.starts_with('+') || suffix.starts_with('-'), "{s}");
        assert_eq!(&suffix[3..4], ":", "{s}");
        let parsed = DateTime::parse_from_rfc3339(&s).unwrap();
        assert_eq!(parsed.with_timezone(&Utc), clock.boundary());
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let mut cursor = CutoverClock::initialize_at(noon(), Duration::ZERO)
            .unwrap()
            .cursor();
        cursor.advance(noon() + TimeDelta::seconds(5));
        cursor.advance(noon() + TimeDelta::seconds(2));
        assert_eq!(cursor.last_processed(), noon() + TimeDelta::seconds(5));
        cursor.advance(noon() + TimeDelta::seconds(9));
        assert_eq!(cursor.last_processed(), noon() + TimeDelta::seconds(9));
    }

    #[test]
    fn test_huge_grace_is_a_startup_error() {
        assert!(CutoverClock::initialize_at(noon(), Duration::from_secs(u64::MAX)).is_err());
    }
}
