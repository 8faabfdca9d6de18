use crate::db::CommitActivityRow;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub date: String,
    pub repo_name: String,
    pub count: u32,
}

/// Shifts a stored UTC instant into `zone` and drops the time of day.
pub fn calendar_date(instant: DateTime<Utc>, zone: &FixedOffset) -> NaiveDate {
    instant.with_timezone(zone).date_naive()
}

pub fn distinct_dates<I>(instants: I, zone: &FixedOffset) -> BTreeSet<NaiveDate>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    instants
        .into_iter()
        .map(|instant| calendar_date(instant, zone))
        .collect()
}

pub fn longest_streak(dates: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0_u32;
    let mut current = 0_u32;
    let mut previous: Option<NaiveDate> = None;

    for date in dates {
        current = match previous {
            Some(prev) if (*date - prev).num_days() == 1 => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        previous = Some(*date);
    }

    longest
}

/// Longest run of commit-free days between `month_start`, the commit dates and `cutoff`.
///
/// Both ends of every interval are excluded, so adjacent dates give a gap of zero.
/// Commit dates outside `[month_start, cutoff]` are ignored.
pub fn longest_gap(dates: &BTreeSet<NaiveDate>, month_start: NaiveDate, cutoff: NaiveDate) -> i64 {
    if cutoff < month_start {
        return 0;
    }

    let boundaries = std::iter::once(month_start)
        .chain(dates.range(month_start..=cutoff).copied())
        .chain(std::iter::once(cutoff))
        .collect::<Vec<_>>();

    boundaries
        .windows(2)
        .map(|pair| ((pair[1] - pair[0]).num_days() - 1).max(0))
        .max()
        .unwrap_or(0)
}

/// Commits per (bucketed date, repository), ordered by date then repository name.
pub fn daily_counts(rows: &[CommitActivityRow], zone: &FixedOffset) -> Vec<DayCount> {
    rows.iter()
        .fold(BTreeMap::new(), |mut acc, row| {
            let key = (calendar_date(row.committed_at, zone), row.repo_name.clone());
            *acc.entry(key).or_insert(0_u32) += 1;
            acc
        })
        .into_iter()
        .map(|((date, repo_name), count)| DayCount {
            date: date.format("%Y-%m-%d").to_string(),
            repo_name,
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{calendar_date, daily_counts, distinct_dates, longest_gap, longest_streak};
    use crate::db::CommitActivityRow;
    use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};
    use std::collections::BTreeSet;

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).expect("valid date")
    }

    fn dates(days: &[u32]) -> BTreeSet<NaiveDate> {
        days.iter().map(|day| jan(*day)).collect()
    }

    fn seoul() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).expect("valid offset")
    }

    #[test]
    fn instants_across_utc_midnight_can_share_a_shifted_date() {
        let before = Utc.with_ymd_and_hms(2025, 1, 1, 23, 45, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 1, 2, 0, 15, 0).unwrap();

        assert_eq!(calendar_date(before, &seoul()), jan(2));
        assert_eq!(calendar_date(after, &seoul()), jan(2));

        let utc = FixedOffset::east_opt(0).expect("utc offset");
        assert_ne!(calendar_date(before, &utc), calendar_date(after, &utc));
    }

    #[test]
    fn instants_half_an_hour_apart_can_split_after_shift() {
        let zone = seoul();
        let before = Utc.with_ymd_and_hms(2025, 1, 1, 14, 45, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 1, 1, 15, 15, 0).unwrap();

        assert_eq!(distinct_dates([before, after], &zone).len(), 2);
    }

    #[test]
    fn streak_counts_consecutive_days() {
        let set = dates(&[1, 2, 3, 5]);
        assert_eq!(longest_streak(&set), 3);
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn streak_of_nothing_is_zero() {
        assert_eq!(longest_streak(&BTreeSet::new()), 0);
        assert_eq!(longest_streak(&dates(&[7])), 1);
    }

    #[test]
    fn gap_covers_month_start_between_and_cutoff() {
        assert_eq!(longest_gap(&dates(&[3, 10]), jan(1), jan(15)), 6);
        assert_eq!(longest_gap(&dates(&[3, 4]), jan(1), jan(15)), 10);
        assert_eq!(longest_gap(&dates(&[12]), jan(1), jan(15)), 10);
    }

    #[test]
    fn gap_without_commits_spans_start_to_cutoff() {
        assert_eq!(longest_gap(&BTreeSet::new(), jan(1), jan(15)), 13);
        assert_eq!(longest_gap(&BTreeSet::new(), jan(1), jan(1)), 0);
    }

    #[test]
    fn adjacent_commit_days_have_zero_gap() {
        assert_eq!(longest_gap(&dates(&[1, 2, 3]), jan(1), jan(4)), 0);
    }

    #[test]
    fn commits_after_cutoff_are_ignored() {
        assert_eq!(longest_gap(&dates(&[2, 20]), jan(1), jan(10)), 7);
    }

    #[test]
    fn same_day_same_repo_collapses() {
        let zone = FixedOffset::east_opt(0).expect("utc offset");
        let rows = vec![
            CommitActivityRow {
                committed_at: Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap(),
                repo_name: "beta".to_string(),
            },
            CommitActivityRow {
                committed_at: Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap(),
                repo_name: "beta".to_string(),
            },
            CommitActivityRow {
                committed_at: Utc.with_ymd_and_hms(2025, 1, 2, 11, 0, 0).unwrap(),
                repo_name: "alpha".to_string(),
            },
            CommitActivityRow {
                committed_at: Utc.with_ymd_and_hms(2025, 1, 1, 11, 0, 0).unwrap(),
                repo_name: "zeta".to_string(),
            },
        ];

        let counts = daily_counts(&rows, &zone)
            .into_iter()
            .map(|entry| (entry.date, entry.repo_name, entry.count))
            .collect::<Vec<_>>();

        assert_eq!(counts, vec![
            ("2025-01-01".to_string(), "zeta".to_string(), 1),
            ("2025-01-02".to_string(), "alpha".to_string(), 1),
            ("2025-01-02".to_string(), "beta".to_string(), 2),
        ]);
    }
}
