pub mod calendar;

use crate::db::{CommitActivityRow, Database, LanguageUsageRow};
use crate::error::{RecapError, Result};
use crate::period::MonthRange;
use calendar::DayCount;
use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveDays {
    pub active_days: u32,
    pub total_days: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub active_days: u32,
    pub total_days: u32,
    pub longest_streak: u32,
    pub longest_gap: i64,
    pub gap_cutoff: String,
    pub each_day_commit_count: Vec<DayCount>,
}

/// One range scan of a user's commits, bucketed into calendar dates of `zone`.
///
/// Every statistic below is derived from the same rows so they never disagree.
#[derive(Debug, Clone)]
pub struct MonthlyActivity {
    range: MonthRange,
    zone: FixedOffset,
    rows: Vec<CommitActivityRow>,
    dates: BTreeSet<NaiveDate>,
}

impl MonthlyActivity {
    pub fn load(
        database: &Database,
        owner: &str,
        range: &MonthRange,
        zone: FixedOffset,
    ) -> Result<Self> {
        let (start, end) = range.local_window(&zone);
        let rows = database.commit_activity(owner, start, end)?;
        Ok(Self::from_rows(*range, zone, rows))
    }

    /// Rows whose bucketed date falls outside the month are dropped here, so no
    /// statistic sees a neighbouring month's day.
    pub fn from_rows(range: MonthRange, zone: FixedOffset, rows: Vec<CommitActivityRow>) -> Self {
        let rows = rows
            .into_iter()
            .filter(|row| range.contains_date(calendar::calendar_date(row.committed_at, &zone)))
            .collect::<Vec<_>>();
        let dates = calendar::distinct_dates(rows.iter().map(|row| row.committed_at), &zone);

        Self {
            range,
            zone,
            rows,
            dates,
        }
    }

    pub fn active_days(&self) -> ActiveDays {
        ActiveDays {
            active_days: self.dates.len() as u32,
            total_days: self.range.days_in_month(),
        }
    }

    pub fn longest_streak(&self) -> u32 {
        calendar::longest_streak(&self.dates)
    }

    pub fn longest_gap(&self, cutoff: NaiveDate) -> i64 {
        calendar::longest_gap(&self.dates, self.range.first_day(), cutoff)
    }

    pub fn daily_counts(&self) -> Vec<DayCount> {
        calendar::daily_counts(&self.rows, &self.zone)
    }

    pub fn summary(&self, cutoff: NaiveDate) -> MonthlySummary {
        let active = self.active_days();

        MonthlySummary {
            year: self.range.year,
            month: self.range.month,
            active_days: active.active_days,
            total_days: active.total_days,
            longest_streak: self.longest_streak(),
            longest_gap: self.longest_gap(cutoff),
            gap_cutoff: cutoff.format("%Y-%m-%d").to_string(),
            each_day_commit_count: self.daily_counts(),
        }
    }
}

pub fn active_days(
    database: &Database,
    owner: &str,
    range: &MonthRange,
    zone: FixedOffset,
) -> Result<ActiveDays> {
    MonthlyActivity::load(database, owner, range, zone)
        .map(|activity| activity.active_days())
        .map_err(RecapError::aggregation("active days"))
}

pub fn longest_streak(
    database: &Database,
    owner: &str,
    range: &MonthRange,
    zone: FixedOffset,
) -> Result<u32> {
    MonthlyActivity::load(database, owner, range, zone)
        .map(|activity| activity.longest_streak())
        .map_err(RecapError::aggregation("longest streak"))
}

/// `cutoff_day` must exist in the month; it is checked before touching storage.
pub fn longest_gap(
    database: &Database,
    owner: &str,
    range: &MonthRange,
    cutoff_day: u32,
    zone: FixedOffset,
) -> Result<i64> {
    let cutoff = range.day(cutoff_day)?;

    MonthlyActivity::load(database, owner, range, zone)
        .map(|activity| activity.longest_gap(cutoff))
        .map_err(RecapError::aggregation("longest gap"))
}

pub fn daily_commit_counts(
    database: &Database,
    owner: &str,
    range: &MonthRange,
    zone: FixedOffset,
) -> Result<Vec<DayCount>> {
    MonthlyActivity::load(database, owner, range, zone)
        .map(|activity| activity.daily_counts())
        .map_err(RecapError::aggregation("each day commit count"))
}

pub fn commit_count(
    database: &Database,
    user: &str,
    repo_name: Option<&str>,
    range: &MonthRange,
) -> Result<i64> {
    database
        .count_commits(user, repo_name, range)
        .map_err(RecapError::aggregation("commit count"))
}

pub fn language_usage(
    database: &Database,
    owner: &str,
    range: &MonthRange,
) -> Result<Vec<LanguageUsageRow>> {
    database
        .language_usage(owner, range)
        .map_err(RecapError::aggregation("used language"))
}

#[cfg(test)]
mod tests {
    use super::{MonthlyActivity, active_days, commit_count, longest_gap, longest_streak};
    use crate::db::{CommitActivityRow, Database};
    use crate::error::RecapError;
    use crate::model::{CommitRecord, RepositoryMeta};
    use crate::period::MonthRange;
    use crate::sync::save_repository_commits;
    use chrono::{Duration, FixedOffset, NaiveDate, TimeZone, Utc};

    fn seoul() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).expect("valid offset")
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).expect("utc offset")
    }

    fn range(month: u32) -> MonthRange {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date");
        MonthRange::resolve_at(2025, month, today).expect("valid month")
    }

    fn seed(database: &mut Database, owner: &str, name: &str, days: &[u32]) {
        let repository = RepositoryMeta {
            name: name.to_string(),
            html_url: format!("https://github.com/{owner}/{name}"),
            private: false,
            updated_at: Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
            created_at: None,
        };
        let commits = days
            .iter()
            .map(|day| CommitRecord {
                sha: format!("{name}-{day}"),
                message: "work".to_string(),
                author: owner.to_string(),
                committed_at: Utc.with_ymd_and_hms(2025, 1, *day, 12, 0, 0).unwrap(),
                files: Vec::new(),
            })
            .collect::<Vec<_>>();

        save_repository_commits(database, owner, &repository, &commits).expect("seeded");
    }

    #[test]
    fn january_example_from_storage() {
        let mut database = Database::open_in_memory().expect("database");
        seed(&mut database, "octo", "recap", &[1, 2, 3, 5]);

        let active = active_days(&database, "octo", &range(1), utc()).expect("active days");
        let streak = longest_streak(&database, "octo", &range(1), utc()).expect("streak");

        assert_eq!(active.active_days, 4);
        assert_eq!(active.total_days, 31);
        assert_eq!(streak, 3);
    }

    #[test]
    fn gap_example_from_storage() {
        let mut database = Database::open_in_memory().expect("database");
        seed(&mut database, "octo", "recap", &[3, 10]);

        let gap = longest_gap(&database, "octo", &range(1), 15, utc()).expect("gap");
        assert_eq!(gap, 6);
    }

    #[test]
    fn no_commits_gives_zero_values() {
        let database = Database::open_in_memory().expect("database");

        let active = active_days(&database, "nobody", &range(2), utc()).expect("active days");
        let streak = longest_streak(&database, "nobody", &range(2), utc()).expect("streak");
        let gap = longest_gap(&database, "nobody", &range(2), 15, utc()).expect("gap");

        assert_eq!(active.active_days, 0);
        assert_eq!(active.total_days, 28);
        assert_eq!(streak, 0);
        assert_eq!(gap, 13);
    }

    #[test]
    fn other_owners_are_not_counted() {
        let mut database = Database::open_in_memory().expect("database");
        seed(&mut database, "octo", "recap", &[1, 2]);
        seed(&mut database, "hubot", "chatops", &[1, 2, 3, 4]);

        let streak = longest_streak(&database, "octo", &range(1), utc()).expect("streak");
        assert_eq!(streak, 2);
    }

    #[test]
    fn gap_cutoff_outside_month_is_rejected() {
        let database = Database::open_in_memory().expect("database");
        let result = longest_gap(&database, "octo", &range(2), 30, utc());
        assert!(matches!(result, Err(RecapError::Validation(_))));
    }

    #[test]
    fn storage_failure_is_tagged_with_operation() {
        let database = Database::open_in_memory().expect("database");
        database
            .connection()
            .execute_batch("DROP TABLE code_changes; DROP TABLE repo_recaps; DROP TABLE commits;")
            .expect("tables dropped");

        match active_days(&database, "octo", &range(1), utc()) {
            Err(RecapError::Aggregation { operation, .. }) => assert_eq!(operation, "active days"),
            other => panic!("expected aggregation error, got {other:?}"),
        }
    }

    #[test]
    fn summary_derives_all_statistics_from_one_scan() {
        let mut database = Database::open_in_memory().expect("database");
        seed(&mut database, "octo", "recap", &[3, 10]);
        seed(&mut database, "octo", "notes", &[10]);

        let activity =
            MonthlyActivity::load(&database, "octo", &range(1), utc()).expect("activity");
        let cutoff = NaiveDate::from_ymd_opt(2025, 1, 15).expect("valid date");
        let summary = activity.summary(cutoff);

        assert_eq!(summary.active_days, 2);
        assert_eq!(summary.longest_streak, 1);
        assert_eq!(summary.longest_gap, 6);
        assert_eq!(summary.each_day_commit_count.len(), 3);
        assert_eq!(summary.each_day_commit_count[1].repo_name, "notes");
    }

    #[test]
    fn commit_count_matches_author_and_repository() {
        let mut database = Database::open_in_memory().expect("database");
        seed(&mut database, "octo", "recap", &[3, 10]);
        seed(&mut database, "octo", "notes", &[10]);

        let total = commit_count(&database, "octo", None, &range(1)).expect("total");
        let single = commit_count(&database, "octo", Some("notes"), &range(1)).expect("single");

        assert_eq!(total, 3);
        assert_eq!(single, 1);
    }

    #[test]
    fn positive_offset_keeps_next_month_days_out() {
        let february = range(2);
        let rows = (0..28 * 4)
            .map(|step| CommitActivityRow {
                committed_at: february.start + Duration::hours(6 * step),
                repo_name: "recap".to_string(),
            })
            .collect::<Vec<_>>();

        let activity = MonthlyActivity::from_rows(february, seoul(), rows);
        let active = activity.active_days();
        let daily = activity.daily_counts();
        let last_day = NaiveDate::from_ymd_opt(2025, 2, 28).expect("valid date");

        assert_eq!(active.active_days, 28);
        assert_eq!(active.total_days, 28);
        assert_eq!(activity.longest_streak(), 28);
        assert_eq!(activity.longest_gap(last_day), 0);
        assert_eq!(daily.last().map(|day| day.date.as_str()), Some("2025-02-28"));
        assert_eq!(daily.iter().map(|day| day.count).sum::<u32>(), 27 * 4 + 3);
    }

    #[test]
    fn late_utc_commit_counts_toward_the_local_month() {
        let mut database = Database::open_in_memory().expect("database");
        let repository = RepositoryMeta {
            name: "recap".to_string(),
            html_url: "https://github.com/octo/recap".to_string(),
            private: false,
            updated_at: Utc.with_ymd_and_hms(2025, 2, 2, 0, 0, 0).unwrap(),
            created_at: None,
        };
        let late = CommitRecord {
            sha: "late".to_string(),
            message: "late night".to_string(),
            author: "octo".to_string(),
            committed_at: Utc.with_ymd_and_hms(2025, 1, 31, 20, 0, 0).unwrap(),
            files: Vec::new(),
        };
        save_repository_commits(&mut database, "octo", &repository, &[late]).expect("seeded");

        let january = active_days(&database, "octo", &range(1), seoul()).expect("january");
        let february = MonthlyActivity::load(&database, "octo", &range(2), seoul())
            .expect("february")
            .daily_counts();

        assert_eq!(january.active_days, 0);
        assert_eq!(february.len(), 1);
        assert_eq!(february[0].date, "2025-02-01");
    }
}
