//! Recency buckets for the history listing

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use std::fmt;

/// Coarse recency group of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeBucket {
    /// Updated today (or, with clock skew, in the future)
    Today,
    /// Updated yesterday
    Yesterday,
    /// Updated 2 to 6 days ago
    LastSevenDays,
    /// Updated 7 to 29 days ago
    LastThirtyDays,
    /// Anything older, by calendar month
    Month {
        /// Calendar year
        year: i32,
        /// Calendar month (1-12)
        month: u32,
    },
}

impl TimeBucket {
    /// Classify a calendar date relative to `today`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use confab::history::TimeBucket;
    ///
    /// let today = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
    /// let day = |d| NaiveDate::from_ymd_opt(2024, 5, d).unwrap();
    /// assert_eq!(TimeBucket::for_date(day(20), today), TimeBucket::Today);
    /// assert_eq!(TimeBucket::for_date(day(19), today), TimeBucket::Yesterday);
    /// assert_eq!(TimeBucket::for_date(day(14), today), TimeBucket::LastSevenDays);
    /// assert_eq!(TimeBucket::for_date(day(1), today), TimeBucket::LastThirtyDays);
    /// ```
    pub fn for_date(date: NaiveDate, today: NaiveDate) -> Self {
        let days = (today - date).num_days();
        match days {
            d if d <= 0 => TimeBucket::Today,
            1 => TimeBucket::Yesterday,
            d if d < 7 => TimeBucket::LastSevenDays,
            d if d < 30 => TimeBucket::LastThirtyDays,
            _ => TimeBucket::Month {
                year: date.year(),
                month: date.month(),
            },
        }
    }

    /// Classify a stored timestamp in the calendar of `now`'s time zone
    pub fn classify<Tz: TimeZone>(updated_at: &DateTime<Utc>, now: &DateTime<Tz>) -> Self {
        let local = updated_at.with_timezone(&now.timezone());
        Self::for_date(local.date_naive(), now.date_naive())
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBucket::Today => write!(f, "Today"),
            TimeBucket::Yesterday => write!(f, "Yesterday"),
            TimeBucket::LastSevenDays => write!(f, "Last 7 days"),
            TimeBucket::LastThirtyDays => write!(f, "Last 30 days"),
            TimeBucket::Month { year, month } => {
                match NaiveDate::from_ymd_opt(*year, *month, 1) {
                    Some(first) => write!(f, "{}", first.format("%B %Y")),
                    None => write!(f, "{}-{:02}", year, month),
                }
            }
        }
    }
}
