//! Query ranges for the calendar's day/week/month views.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Local, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime,
    SecondsFormat, TimeZone,
};
use serde::{Deserialize, Serialize};

/// View granularity of the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Day,
    #[default]
    Week,
    Month,
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViewKind::Day => "day",
            ViewKind::Week => "week",
            ViewKind::Month => "month",
        };
        f.write_str(name)
    }
}

impl FromStr for ViewKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(ViewKind::Day),
            "week" => Ok(ViewKind::Week),
            "month" => Ok(ViewKind::Month),
            other => Err(format!("unknown view: {}", other)),
        }
    }
}

/// Inclusive query window, expressed in the zone it was computed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub time_min: DateTime<FixedOffset>,
    pub time_max: DateTime<FixedOffset>,
}

impl TimeRange {
    /// `timeMin` as sent on the wire.
    pub fn time_min_iso(&self) -> String {
        self.time_min.to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    /// `timeMax` as sent on the wire.
    pub fn time_max_iso(&self) -> String {
        self.time_max.to_rfc3339_opts(SecondsFormat::Secs, false)
    }
}

/// Range for `view` around `date` in the local zone.
pub fn view_range(date: NaiveDate, view: ViewKind) -> TimeRange {
    view_range_in(date, view, &Local)
}

/// Range for `view` around `date` in `tz`. Weeks run Monday to Sunday.
pub fn view_range_in<Tz: TimeZone>(date: NaiveDate, view: ViewKind, tz: &Tz) -> TimeRange {
    let (first, last) = match view {
        ViewKind::Day => (date, date),
        ViewKind::Week => {
            let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
            (monday, monday + Duration::days(6))
        }
        ViewKind::Month => {
            let first = date - Duration::days(i64::from(date.day0()));
            let last = first
                .checked_add_months(Months::new(1))
                .and_then(|next| next.pred_opt())
                .unwrap_or(date);
            (first, last)
        }
    };

    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);

    TimeRange {
        time_min: at_local(tz, first.and_time(NaiveTime::MIN)).fixed_offset(),
        time_max: at_local(tz, last.and_time(end_of_day)).fixed_offset(),
    }
}

/// Resolve a wall-clock time in `tz`. Ambiguous times take the earlier
/// instant; times inside a DST gap move forward past it.
pub fn at_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cet() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    #[test]
    fn test_week_runs_monday_to_sunday() {
        // 2024-03-01 is a Friday
        let range = view_range_in(date(2024, 3, 1), ViewKind::Week, &cet());
        assert_eq!(range.time_min_iso(), "2024-02-26T00:00:00+01:00");
        assert_eq!(range.time_max_iso(), "2024-03-03T23:59:59+01:00");
    }

    #[test]
    fn test_week_on_monday_and_sunday() {
        let monday = view_range_in(date(2024, 2, 26), ViewKind::Week, &cet());
        let sunday = view_range_in(date(2024, 3, 3), ViewKind::Week, &cet());
        assert_eq!(monday, sunday);
        assert_eq!(monday.time_min.date_naive(), date(2024, 2, 26));
    }

    #[test]
    fn test_day_range() {
        let range = view_range_in(date(2024, 3, 1), ViewKind::Day, &cet());
        assert_eq!(range.time_min_iso(), "2024-03-01T00:00:00+01:00");
        assert_eq!(range.time_max_iso(), "2024-03-01T23:59:59+01:00");
    }

    #[test]
    fn test_month_range_handles_leap_february() {
        let range = view_range_in(date(2024, 2, 14), ViewKind::Month, &cet());
        assert_eq!(range.time_min_iso(), "2024-02-01T00:00:00+01:00");
        assert_eq!(range.time_max_iso(), "2024-02-29T23:59:59+01:00");

        let december = view_range_in(date(2023, 12, 31), ViewKind::Month, &cet());
        assert_eq!(december.time_max_iso(), "2023-12-31T23:59:59+01:00");
    }

    #[test]
    fn test_local_week_starts_on_monday() {
        let range = view_range(date(2024, 3, 1), ViewKind::Week);
        assert_eq!(range.time_min.weekday(), chrono::Weekday::Mon);
        assert_eq!(range.time_min.time(), NaiveTime::MIN);
        assert_eq!(range.time_max.weekday(), chrono::Weekday::Sun);
    }

    #[test]
    fn test_view_kind_parse() {
        assert_eq!("Week".parse::<ViewKind>().unwrap(), ViewKind::Week);
        assert!("year".parse::<ViewKind>().is_err());
        assert_eq!(ViewKind::Month.to_string(), "month");
    }
}
