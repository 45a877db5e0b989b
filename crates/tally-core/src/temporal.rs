//! # Temporal Types
//!
//! Two kinds of time appear in the guard layer:
//!
//! - [`Timestamp`] — an instant, UTC only, truncated to seconds. Used for
//!   audit records and operational events, where it feeds the checksum and
//!   must render identically on every machine.
//! - [`BusinessDate`] — a calendar date with no time zone. Used for effective
//!   dates (invoice issue date, cash business day) and accounting period
//!   bounds.
//!
//! Stored records may carry either `YYYY-MM-DD` or a full RFC 3339 instant in
//! a date column. [`BusinessDate::parse`] accepts both and normalizes to the
//! UTC calendar date.

use chrono::{DateTime, Days, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// A UTC-only timestamp, truncated to seconds precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// From a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse an RFC 3339 string with a `Z` suffix.
    ///
    /// Explicit offsets (including `+00:00`) are rejected so that the
    /// rendered form, and therefore any checksum over it, is unique.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if !s.ends_with('Z') {
            return Err(CoreError::InvalidDate(format!(
                "timestamp must use Z suffix (UTC only), got: {s:?}"
            )));
        }
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| CoreError::InvalidDate(format!("invalid RFC 3339 timestamp {s:?}: {e}")))?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// The UTC calendar date of this instant.
    pub fn date(&self) -> BusinessDate {
        BusinessDate(self.0.date_naive())
    }

    /// Render as ISO 8601 with Z suffix (e.g. `2026-01-15T12:00:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

/// A calendar date used as an effective date or period bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BusinessDate(NaiveDate);

impl BusinessDate {
    /// Wrap a `NaiveDate`.
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Build from year, month and day.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, CoreError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| CoreError::InvalidDate(format!("{year:04}-{month:02}-{day:02}")))
    }

    /// Parse `YYYY-MM-DD` or an RFC 3339 instant (converted to its UTC date).
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self(d));
        }
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc).date_naive()))
            .map_err(|e| CoreError::InvalidDate(format!("{s:?}: {e}")))
    }

    /// Read a date out of a JSON value. Non-string or unparseable values
    /// yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_str().and_then(|s| Self::parse(s).ok())
    }

    /// The following calendar day.
    pub fn next_day(&self) -> Option<Self> {
        self.0.checked_add_days(Days::new(1)).map(Self)
    }

    /// Access the inner `NaiveDate`.
    pub fn as_naive(&self) -> &NaiveDate {
        &self.0
    }

    /// JSON string form (`YYYY-MM-DD`), suitable for filters.
    pub fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl std::fmt::Display for BusinessDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn now_has_no_subseconds() {
        assert_eq!(Timestamp::now().as_datetime().nanosecond(), 0);
    }

    #[test]
    fn from_utc_truncates() {
        let dt = Utc
            .with_ymd_and_hms(2026, 1, 15, 12, 30, 45)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        assert_eq!(Timestamp::from_utc(dt).to_iso8601(), "2026-01-15T12:30:45Z");
    }

    #[test]
    fn parse_rejects_offsets() {
        assert!(Timestamp::parse("2026-01-15T12:00:00Z").is_ok());
        assert!(Timestamp::parse("2026-01-15T12:00:00+00:00").is_err());
        assert!(Timestamp::parse("2026-01-15T17:00:00+05:00").is_err());
        assert!(Timestamp::parse("2026-01-15").is_err());
    }

    #[test]
    fn timestamp_serde_roundtrip() {
        let ts = Timestamp::parse("2026-03-01T08:00:00Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(serde_json::from_str::<Timestamp>(&json).unwrap(), ts);
    }

    #[test]
    fn business_date_parses_plain_dates() {
        let d = BusinessDate::parse("2025-03-31").unwrap();
        assert_eq!(d.to_string(), "2025-03-31");
    }

    #[test]
    fn business_date_parses_instants_as_utc_date() {
        assert_eq!(
            BusinessDate::parse("2025-03-31T23:30:00Z").unwrap(),
            BusinessDate::from_ymd(2025, 3, 31).unwrap()
        );
        assert_eq!(
            BusinessDate::parse("2025-04-01T01:00:00+02:00").unwrap(),
            BusinessDate::from_ymd(2025, 3, 31).unwrap()
        );
    }

    #[test]
    fn business_date_from_value_ignores_garbage() {
        assert!(BusinessDate::from_value(&Value::Null).is_none());
        assert!(BusinessDate::from_value(&serde_json::json!(20250101)).is_none());
        assert!(BusinessDate::from_value(&serde_json::json!("yesterday")).is_none());
    }

    #[test]
    fn next_day_crosses_month_boundary() {
        let d = BusinessDate::from_ymd(2024, 2, 29).unwrap();
        assert_eq!(d.next_day().unwrap().to_string(), "2024-03-01");
    }

    #[test]
    fn invalid_ymd_is_rejected() {
        assert!(BusinessDate::from_ymd(2025, 2, 30).is_err());
    }
}
