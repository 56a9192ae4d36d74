//! Window arithmetic for closing.
//!
//! All windows are computed on local calendar dates in the team's configured
//! UTC offset. Weeks start on Monday. Months are identified by their first
//! day and rendered as `YYYY-MM` keys.

use chrono::{DateTime, Datelike, Days, Duration, FixedOffset, Months, NaiveDate, NaiveTime, Utc};

use crate::{Error, Result};

const MONTH_KEY_FORMAT: &str = "%Y-%m";

/// Build a fixed offset from whole minutes east of UTC.
pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset> {
  minutes
    .checked_mul(60)
    .and_then(FixedOffset::east_opt)
    .ok_or(Error::InvalidOffset(minutes))
}

/// The calendar date `now` falls on in `offset`.
pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
  now.with_timezone(&offset).date_naive()
}

/// The instant `date` begins in `offset`.
pub fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
  let shift = Duration::seconds(i64::from(offset.local_minus_utc()));
  (date.and_time(NaiveTime::MIN) - shift).and_utc()
}

pub fn previous_day(today: NaiveDate) -> NaiveDate { today - Days::new(1) }

pub fn next_day(date: NaiveDate) -> NaiveDate { date + Days::new(1) }

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
  date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

/// Sunday of the week starting at `start`.
pub fn week_end(start: NaiveDate) -> NaiveDate { start + Days::new(6) }

/// Monday of the week after the one starting at `start`.
pub fn next_week_start(start: NaiveDate) -> NaiveDate { start + Days::new(7) }

/// Monday of the week immediately preceding the week containing `today`.
pub fn previous_week_start(today: NaiveDate) -> NaiveDate {
  week_start(today) - Days::new(7)
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
  date - Days::new(u64::from(date.day0()))
}

/// First day of the calendar month immediately preceding the one containing
/// `today`.
pub fn previous_month_start(today: NaiveDate) -> NaiveDate {
  month_start(today) - Months::new(1)
}

/// First day of the month after the one containing `date`.
pub fn next_month_start(date: NaiveDate) -> NaiveDate { month_start(date) + Months::new(1) }

/// The month a weekly penalty for the week starting at `start` is booked
/// against: the month containing the week's last day.
pub fn week_attribution_month(start: NaiveDate) -> NaiveDate {
  month_start(week_end(start))
}

pub fn month_key(month: NaiveDate) -> String { month.format(MONTH_KEY_FORMAT).to_string() }

/// Parse a `YYYY-MM` key into the month's first day.
pub fn parse_month_key(key: &str) -> Result<NaiveDate> {
  let trimmed = key.trim();
  let valid_shape = trimmed.len() == 7 && trimmed.as_bytes()[4] == b'-';
  if !valid_shape {
    return Err(Error::InvalidMonth(key.to_string()));
  }
  NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d")
    .map_err(|_| Error::InvalidMonth(key.to_string()))
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  #[test]
  fn local_date_respects_offset() {
    let jst = offset_from_minutes(540).unwrap();
    // 2026-03-31T16:00Z is already April 1st in UTC+9.
    let now = Utc.with_ymd_and_hms(2026, 3, 31, 16, 0, 0).unwrap();
    assert_eq!(local_date(now, jst), date(2026, 4, 1));
    assert_eq!(local_date(now, offset_from_minutes(0).unwrap()), date(2026, 3, 31));
  }

  #[test]
  fn local_midnight_is_shifted_by_the_offset() {
    let jst = offset_from_minutes(540).unwrap();
    let utc = offset_from_minutes(0).unwrap();
    assert_eq!(
      local_midnight(date(2026, 4, 1), jst),
      Utc.with_ymd_and_hms(2026, 3, 31, 15, 0, 0).unwrap()
    );
    assert_eq!(
      local_midnight(date(2026, 4, 1), utc),
      Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()
    );
  }

  #[test]
  fn rejects_out_of_range_offsets() {
    assert!(offset_from_minutes(24 * 60).is_err());
    assert!(offset_from_minutes(-300).is_ok());
  }

  #[test]
  fn weeks_start_on_monday() {
    // 2026-10-19 is a Monday.
    assert_eq!(week_start(date(2026, 10, 19)), date(2026, 10, 19));
    assert_eq!(week_start(date(2026, 10, 25)), date(2026, 10, 19));
    assert_eq!(previous_week_start(date(2026, 10, 21)), date(2026, 10, 12));
    assert_eq!(week_end(date(2026, 10, 12)), date(2026, 10, 18));
  }

  #[test]
  fn previous_month_crosses_year_boundary() {
    assert_eq!(previous_month_start(date(2026, 1, 15)), date(2025, 12, 1));
    assert_eq!(previous_month_start(date(2026, 3, 31)), date(2026, 2, 1));
    assert_eq!(next_month_start(date(2026, 12, 15)), date(2027, 1, 1));
  }

  #[test]
  fn straddling_week_is_booked_to_its_final_month() {
    // Monday 2026-06-29 .. Sunday 2026-07-05.
    assert_eq!(week_attribution_month(date(2026, 6, 29)), date(2026, 7, 1));
    assert_eq!(week_attribution_month(date(2026, 6, 22)), date(2026, 6, 1));
  }

  #[test]
  fn month_keys() {
    assert_eq!(month_key(date(2026, 2, 1)), "2026-02");
    assert_eq!(parse_month_key("2026-02").unwrap(), date(2026, 2, 1));
    assert!(parse_month_key("2026-13").is_err());
    assert!(parse_month_key("2026-2").is_err());
    assert!(parse_month_key("").is_err());
  }
}
