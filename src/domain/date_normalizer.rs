//! Canonical UTC day keys for metric points.
//!
//! Any date-like input resolves to a `NaiveDate` on the UTC calendar.
//! Unparseable or missing input falls back to today's UTC date; nothing
//! here returns an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::trace;

/// Storage and display format of a date key.
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// A date as it arrives at the update boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum DateInput {
    Text(String),
    EpochMillis(f64),
    Day(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl DateInput {
    /// Reads a loosely-typed JSON date. Strings are kept as text, numbers are
    /// epoch milliseconds; anything else counts as absent.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(DateInput::Text(s.clone())),
            Value::Number(n) => n.as_f64().map(DateInput::EpochMillis),
            other => {
                trace!(value = %other, "ignoring non-date value");
                None
            }
        }
    }

    /// The raw form of this date, used as a category label when a
    /// multi-value batch has no labeled entries. Empty text yields `None`.
    pub fn label(&self) -> Option<String> {
        match self {
            DateInput::Text(s) if s.is_empty() => None,
            DateInput::Text(s) => Some(s.clone()),
            DateInput::EpochMillis(ms) => Some(ms.to_string()),
            DateInput::Day(d) => Some(date_key(*d)),
            DateInput::Timestamp(ts) => Some(ts.to_rfc3339()),
        }
    }

    fn to_utc_day(&self) -> Option<NaiveDate> {
        match self {
            DateInput::Day(d) => Some(*d),
            DateInput::Timestamp(ts) => Some(ts.date_naive()),
            DateInput::EpochMillis(ms) if ms.is_finite() => {
                DateTime::<Utc>::from_timestamp_millis(*ms as i64).map(|ts| ts.date_naive())
            }
            DateInput::EpochMillis(_) => None,
            DateInput::Text(s) => parse_date_text(s),
        }
    }
}

impl From<&str> for DateInput {
    fn from(s: &str) -> Self {
        DateInput::Text(s.to_string())
    }
}

impl From<String> for DateInput {
    fn from(s: String) -> Self {
        DateInput::Text(s)
    }
}

impl From<NaiveDate> for DateInput {
    fn from(d: NaiveDate) -> Self {
        DateInput::Day(d)
    }
}

impl From<DateTime<Utc>> for DateInput {
    fn from(ts: DateTime<Utc>) -> Self {
        DateInput::Timestamp(ts)
    }
}

/// Serde hook for `Option<DateInput>` fields: never fails, maps unusable
/// JSON to `None`.
pub(crate) fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<DateInput>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(DateInput::from_json))
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// Normalizes to a UTC calendar day, defaulting to today.
pub fn normalize_date_only(input: Option<&DateInput>) -> NaiveDate {
    normalize_date_only_at(input, today_utc())
}

/// Same as [`normalize_date_only`] with an explicit fallback day.
pub fn normalize_date_only_at(input: Option<&DateInput>, today: NaiveDate) -> NaiveDate {
    match input.and_then(DateInput::to_utc_day) {
        Some(day) => day,
        None => {
            trace!(?input, %today, "date missing or unparseable, using fallback day");
            today
        }
    }
}

fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }

    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    // Offset-less timestamps are read as UTC.
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fallback() -> NaiveDate {
        day(2030, 6, 15)
    }

    fn norm(input: impl Into<DateInput>) -> NaiveDate {
        normalize_date_only_at(Some(&input.into()), fallback())
    }

    #[test]
    fn date_only_string() {
        assert_eq!(norm("2024-01-01"), day(2024, 1, 1));
        assert_eq!(norm("  2024-03-09 "), day(2024, 3, 9));
        assert_eq!(norm("2024/03/09"), day(2024, 3, 9));
    }

    #[test]
    fn rfc3339_converts_to_utc_day() {
        assert_eq!(norm("2024-01-01T23:30:00-05:00"), day(2024, 1, 2));
        assert_eq!(norm("2024-01-01T10:00:00Z"), day(2024, 1, 1));
        assert_eq!(norm("2024-01-01T00:30:00+02:00"), day(2023, 12, 31));
    }

    #[test]
    fn offsetless_timestamps_keep_their_day() {
        assert_eq!(norm("2024-05-06T13:14:15"), day(2024, 5, 6));
        assert_eq!(norm("2024-05-06T13:14:15.123"), day(2024, 5, 6));
        assert_eq!(norm("2024-05-06 08:00"), day(2024, 5, 6));
    }

    #[test]
    fn rfc2822_is_accepted() {
        assert_eq!(norm("Tue, 1 Jul 2003 10:52:37 +0200"), day(2003, 7, 1));
    }

    #[test]
    fn typed_inputs() {
        assert_eq!(norm(day(2024, 2, 29)), day(2024, 2, 29));
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap();
        assert_eq!(norm(ts), day(2024, 2, 29));
    }

    #[test]
    fn epoch_millis() {
        // 2024-01-01T00:00:00Z
        let input = DateInput::EpochMillis(1_704_067_200_000.0);
        assert_eq!(normalize_date_only_at(Some(&input), fallback()), day(2024, 1, 1));
        let bad = DateInput::EpochMillis(f64::NAN);
        assert_eq!(normalize_date_only_at(Some(&bad), fallback()), fallback());
    }

    #[test]
    fn invalid_and_missing_fall_back() {
        assert_eq!(norm("not a date"), fallback());
        assert_eq!(norm(""), fallback());
        assert_eq!(norm("2024-13-45"), fallback());
        assert_eq!(normalize_date_only_at(None, fallback()), fallback());
    }

    #[test]
    fn default_fallback_is_today() {
        let before = today_utc();
        let got = normalize_date_only(None);
        let after = today_utc();
        assert!(got == before || got == after);
    }

    #[test]
    fn idempotent_through_key() {
        for raw in ["2024-01-01T23:30:00-05:00", "garbage", "2020/02/02", ""] {
            let once = norm(raw);
            let twice = norm(date_key(once));
            assert_eq!(once, twice, "{raw}");
        }
    }

    #[test]
    fn from_json_accepts_strings_and_numbers() {
        assert_eq!(
            DateInput::from_json(&json!("2024-01-01")),
            Some(DateInput::Text("2024-01-01".into()))
        );
        assert_eq!(
            DateInput::from_json(&json!(1000)),
            Some(DateInput::EpochMillis(1000.0))
        );
        assert_eq!(DateInput::from_json(&json!(true)), None);
        assert_eq!(DateInput::from_json(&json!({"d": 1})), None);
    }

    #[test]
    fn label_uses_raw_text() {
        assert_eq!(DateInput::from("North").label(), Some("North".into()));
        assert_eq!(DateInput::from("").label(), None);
        assert_eq!(DateInput::from(day(2024, 1, 2)).label(), Some("2024-01-02".into()));
    }
}
