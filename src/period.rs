use crate::error::{RecapError, Result};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc};

pub const EARLIEST_YEAR: i32 = 2005;

/// Half-open UTC window `[start, end)` covering one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRange {
    pub year: i32,
    pub month: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MonthRange {
    /// Resolves `(year, month)` against the current UTC year.
    pub fn resolve(year: i32, month: u32) -> Result<Self> {
        Self::resolve_at(year, month, Utc::now().date_naive())
    }

    pub fn resolve_at(year: i32, month: u32, today: NaiveDate) -> Result<Self> {
        if year < EARLIEST_YEAR || year > today.year() {
            return Err(RecapError::validation(format!(
                "Invalid year: {year}. Expected {EARLIEST_YEAR}..={}",
                today.year()
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(RecapError::validation(format!(
                "Invalid month: {month}. Expected 1..=12"
            )));
        }

        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| RecapError::validation(format!("Invalid month: {year}-{month}")))?;
        let next = first_of_next_month(first)?;

        Ok(Self {
            year,
            month,
            start: Utc.from_utc_datetime(&first.and_time(chrono::NaiveTime::MIN)),
            end: Utc.from_utc_datetime(&next.and_time(chrono::NaiveTime::MIN)),
        })
    }

    pub fn first_day(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Calendar length of the month, independent of how `end` is defined.
    pub fn days_in_month(&self) -> u32 {
        days_in_month(self.year, self.month)
    }

    /// The `day`-th date of this month, rejected when it does not exist.
    pub fn day(&self, day: u32) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day).ok_or_else(|| {
            RecapError::validation(format!(
                "Invalid day: {day}. {}-{:02} has {} days",
                self.year,
                self.month,
                self.days_in_month()
            ))
        })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// `[start, end)` moved so that it spans the month's local days in `zone`.
    pub fn local_window(&self, zone: &FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
        let shift = Duration::seconds(i64::from(zone.local_minus_utc()));
        (self.start - shift, self.end - shift)
    }

    pub fn start_ts(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_ts(&self) -> i64 {
        self.end.timestamp()
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return 0;
    };

    first_of_next_month(first)
        .map(|next| (next - first).num_days() as u32)
        .unwrap_or(31)
}

fn first_of_next_month(first: NaiveDate) -> Result<NaiveDate> {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| RecapError::validation(format!("Month out of range: {first}")))
}
