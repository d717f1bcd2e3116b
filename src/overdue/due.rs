//! Due-date evaluation in the process-wide reference timezone.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use thiserror::Error;

use crate::models::Task;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DueError {
    #[error("invalid due date {0:?}, expected YYYY-MM-DD")]
    Date(String),

    #[error("invalid due time {0:?}, expected HH:MM")]
    Time(String),

    #[error("invalid UTC offset {0:?}, expected +HH:MM")]
    Offset(String),
}

/// The single fixed timezone every due comparison uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceZone(FixedOffset);

impl ReferenceZone {
    pub fn new(offset: FixedOffset) -> Self {
        ReferenceZone(offset)
    }

    pub fn utc() -> Self {
        ReferenceZone(Utc.fix())
    }

    pub fn offset(&self) -> FixedOffset {
        self.0
    }

    pub fn localize(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.0)
    }

    /// Combines a `YYYY-MM-DD` date and an `HH:MM` (or `HH:MM:SS`) time.
    pub fn due_at(&self, date: &str, time: &str) -> Result<DateTime<FixedOffset>, DueError> {
        let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| DueError::Date(date.to_string()))?;
        let clock = NaiveTime::parse_from_str(time.trim(), "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M"))
            .map_err(|_| DueError::Time(time.to_string()))?;
        self.0
            .from_local_datetime(&NaiveDateTime::new(day, clock))
            .single()
            .ok_or_else(|| DueError::Time(time.to_string()))
    }
}

impl Default for ReferenceZone {
    fn default() -> Self {
        // India Standard Time, the zone the product launched in.
        ReferenceZone(FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap_or_else(|| Utc.fix()))
    }
}

impl fmt::Display for ReferenceZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReferenceZone {
    type Err = DueError;

    /// Accepts `UTC`, `Z`, or a signed `+HH:MM` / `-HH:MM` offset.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.eq_ignore_ascii_case("utc") || raw == "Z" {
            return Ok(Self::utc());
        }
        let bad = || DueError::Offset(s.to_string());
        let (sign, rest) = match raw.chars().next() {
            Some('+') => (1, &raw[1..]),
            Some('-') => (-1, &raw[1..]),
            _ => return Err(bad()),
        };
        let (hours, minutes) = rest.split_once(':').ok_or_else(bad)?;
        let hours: i32 = hours.parse().map_err(|_| bad())?;
        let minutes: i32 = minutes.parse().map_err(|_| bad())?;
        if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
            return Err(bad());
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(ReferenceZone)
            .ok_or_else(bad)
    }
}

/// Where a task stands against its deadline at a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueState {
    Missing,
    Invalid(DueError),
    Upcoming(DateTime<FixedOffset>),
    Overdue(DateTime<FixedOffset>),
}

/// Overdue means the due instant is strictly before `now`.
pub fn evaluate(task: &Task, zone: ReferenceZone, now: DateTime<Utc>) -> DueState {
    let (Some(date), Some(time)) = (task.due_date.as_deref(), task.due_time.as_deref()) else {
        return DueState::Missing;
    };
    if date.trim().is_empty() || time.trim().is_empty() {
        return DueState::Missing;
    }
    match zone.due_at(date, time) {
        Ok(due) if due < zone.localize(now) => DueState::Overdue(due),
        Ok(due) => DueState::Upcoming(due),
        Err(e) => DueState::Invalid(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ist() -> ReferenceZone {
        "+05:30".parse().unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn task(date: Option<&str>, time: Option<&str>) -> Task {
        let mut t = Task::new("Ship".into(), "it".into(), vec!["u1".into()]);
        t.due_date = date.map(str::to_string);
        t.due_time = time.map(str::to_string);
        t
    }

    #[rstest]
    #[case("+05:30", 19_800)]
    #[case("-08:00", -28_800)]
    #[case("UTC", 0)]
    #[case("Z", 0)]
    fn parses_offsets(#[case] raw: &str, #[case] seconds: i32) {
        let zone: ReferenceZone = raw.parse().unwrap();
        assert_eq!(zone.offset().local_minus_utc(), seconds);
    }

    #[rstest]
    #[case("05:30")]
    #[case("+5")]
    #[case("+25:00")]
    #[case("Asia/Kolkata")]
    fn rejects_bad_offsets(#[case] raw: &str) {
        assert!(raw.parse::<ReferenceZone>().is_err());
    }

    #[test]
    fn default_zone_is_ist() {
        assert_eq!(ReferenceZone::default(), ist());
    }

    #[test]
    fn due_is_interpreted_in_reference_zone() {
        let due = ist().due_at("2024-01-01", "10:00").unwrap();
        assert_eq!(due.with_timezone(&Utc), utc("2024-01-01T04:30:00Z"));
    }

    #[test]
    fn accepts_seconds_in_due_time() {
        let due = ist().due_at("2024-01-01", "10:00:30").unwrap();
        assert_eq!(due.with_timezone(&Utc), utc("2024-01-01T04:30:30Z"));
    }

    #[rstest]
    #[case("2024-13-01", "10:00")]
    #[case("01/01/2024", "10:00")]
    #[case("2024-01-01", "25:00")]
    #[case("2024-01-01", "ten")]
    fn unparsable_due_is_invalid(#[case] date: &str, #[case] time: &str) {
        let state = evaluate(&task(Some(date), Some(time)), ist(), utc("2030-01-01T00:00:00Z"));
        assert!(matches!(state, DueState::Invalid(_)));
    }

    #[rstest]
    #[case(None, Some("10:00"))]
    #[case(Some("2024-01-01"), None)]
    #[case(Some(""), Some("10:00"))]
    fn missing_parts_are_missing(#[case] date: Option<&str>, #[case] time: Option<&str>) {
        let state = evaluate(&task(date, time), ist(), utc("2030-01-01T00:00:00Z"));
        assert_eq!(state, DueState::Missing);
    }

    #[test]
    fn exactly_due_is_not_overdue() {
        let t = task(Some("2024-01-01"), Some("10:00"));
        assert!(matches!(
            evaluate(&t, ist(), utc("2024-01-01T04:30:00Z")),
            DueState::Upcoming(_)
        ));
    }

    #[test]
    fn invalid_state_can_be_cloned_for_reporting() {
        let state = evaluate(&task(Some("2024-02-30"), Some("10:00")), ist(), utc("2030-01-01T00:00:00Z"));
        let copy = state.clone();
        assert_eq!(copy, DueState::Invalid(DueError::Date("2024-02-30".to_string())));
        assert_eq!(state, copy);
    }

    #[test]
    fn one_second_late_is_overdue() {
        let t = task(Some("2024-01-01"), Some("10:00"));
        assert!(matches!(
            evaluate(&t, ist(), utc("2024-01-01T04:30:01Z")),
            DueState::Overdue(_)
        ));
    }
}
