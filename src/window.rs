//! Resolves filter requests into concrete date windows.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use thiserror::Error;

/// The errors that can occur while resolving a custom filter window.
#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    /// The custom filter was requested without both of its bounds.
    #[error("the custom filter requires both from_date and to_date")]
    MissingBound,

    /// A custom bound could not be parsed as an ISO-8601 date or date-time.
    #[error("could not parse \"{0}\" as an ISO-8601 date or date-time")]
    InvalidDate(String),
}

/// A closed interval of time used to filter expenses by creation date.
///
/// Both bounds are inclusive: a query over the window matches rows with
/// `start <= created_at <= end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// Resolve filter input into a concrete window.
    ///
    /// The named presets are `past_week` (7 days), `past_month` (30 days), and
    /// `last_three_month` (90 days), each ending at `now`. An unrecognized or
    /// absent filter name falls back to `past_week`. The `custom` filter takes
    /// both bounds from `from_date` and `to_date` instead; the bounds are not
    /// required to be ordered, an inverted window simply matches nothing.
    ///
    /// # Errors
    ///
    /// This function will return an error if the `custom` filter is missing
    /// either bound or a bound cannot be parsed.
    pub fn resolve(
        filter: Option<&str>,
        from_date: Option<&str>,
        to_date: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, WindowError> {
        match filter {
            Some("custom") => {
                let from_date = from_date.ok_or(WindowError::MissingBound)?;
                let to_date = to_date.ok_or(WindowError::MissingBound)?;

                Ok(Self {
                    start: parse_bound(from_date)?,
                    end: parse_bound(to_date)?,
                })
            }
            Some("past_month") => Ok(Self::ending_at(now, Duration::days(30))),
            Some("last_three_month") => Ok(Self::ending_at(now, Duration::days(90))),
            // Anything else, including no filter at all, gets the past week.
            _ => Ok(Self::ending_at(now, Duration::days(7))),
        }
    }

    fn ending_at(end: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start: end - length,
            end,
        }
    }
}

/// Parse a custom window bound.
///
/// Accepts an RFC 3339 date-time, a date-time without an offset (read as UTC),
/// or a plain `YYYY-MM-DD` date (read as UTC midnight).
fn parse_bound(text: &str) -> Result<DateTime<Utc>, WindowError> {
    if let Ok(date_time) = DateTime::parse_from_rfc3339(text) {
        return Ok(date_time.with_timezone(&Utc));
    }

    if let Ok(date_time) = text.parse::<NaiveDateTime>() {
        return Ok(date_time.and_utc());
    }

    text.parse::<NaiveDate>()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| WindowError::InvalidDate(text.to_string()))
}

#[cfg(test)]
mod date_window_tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::window::{DateWindow, WindowError};

    #[test]
    fn named_windows_end_at_now() {
        let now = Utc::now();

        for (name, days) in [
            ("past_week", 7),
            ("past_month", 30),
            ("last_three_month", 90),
        ] {
            let window = DateWindow::resolve(Some(name), None, None, now).unwrap();

            assert_eq!(window.end, now);
            assert_eq!(window.start, now - Duration::days(days));
        }
    }

    #[test]
    fn absent_filter_defaults_to_past_week() {
        let now = Utc::now();

        let window = DateWindow::resolve(None, None, None, now).unwrap();

        assert_eq!(window.start, now - Duration::days(7));
        assert_eq!(window.end, now);
    }

    #[test]
    fn unrecognized_filter_defaults_to_past_week() {
        let now = Utc::now();

        let window = DateWindow::resolve(Some("next_year"), None, None, now).unwrap();

        assert_eq!(window.start, now - Duration::days(7));
        assert_eq!(window.end, now);
    }

    #[test]
    fn custom_window_parses_plain_dates_as_midnight() {
        let window = DateWindow::resolve(
            Some("custom"),
            Some("2024-01-01"),
            Some("2024-01-02"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn custom_window_parses_date_times() {
        let window = DateWindow::resolve(
            Some("custom"),
            Some("2024-01-01T09:30:00"),
            Some("2024-01-02T17:00:00+00:00"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 1, 2, 17, 0, 0).unwrap());
    }

    #[test]
    fn custom_window_fails_without_both_bounds() {
        let now = Utc::now();

        assert_eq!(
            DateWindow::resolve(Some("custom"), Some("2024-01-01"), None, now),
            Err(WindowError::MissingBound)
        );
        assert_eq!(
            DateWindow::resolve(Some("custom"), None, Some("2024-01-02"), now),
            Err(WindowError::MissingBound)
        );
    }

    #[test]
    fn custom_window_fails_on_unparseable_date() {
        let result = DateWindow::resolve(
            Some("custom"),
            Some("last tuesday"),
            Some("2024-01-02"),
            Utc::now(),
        );

        assert_eq!(
            result,
            Err(WindowError::InvalidDate("last tuesday".to_string()))
        );
    }
}
