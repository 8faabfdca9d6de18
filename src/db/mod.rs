pub mod queries;

use crate::error::Result;
use crate::model::{CommitRecord, FileChangeRecord, RepositoryMeta};
use crate::period::MonthRange;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct CommitActivityRow {
    pub committed_at: DateTime<Utc>,
    pub repo_name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LanguageUsageRow {
    pub language: String,
    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct CommitRefRow {
    pub commit_id: i64,
    pub repo_id: i64,
    pub repo_name: String,
}

#[derive(Debug, Clone)]
pub struct CommitChangeRow {
    pub message: String,
    pub path: Option<String>,
    pub change_type: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecapRow {
    pub repo_id: i64,
    pub repo_name: String,
    pub year: i32,
    pub month: u32,
    pub content: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TableCounts {
    pub repositories: i64,
    pub commits: i64,
    pub code_changes: i64,
}

/// One scoped storage handle. The connection closes when the value drops.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let database = Self { conn };
        database.init_schema()?;

        Ok(database)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let database = Self {
            conn: Connection::open_in_memory()?,
        };
        database.init_schema()?;

        Ok(database)
    }

    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| self.conn.execute(statement, []).map(|_| ()))?;

        Ok(())
    }

    pub fn repository_last_updated(&self, owner: &str, url: &str) -> Result<Option<DateTime<Utc>>> {
        let stored = self
            .conn
            .query_row(
                "SELECT last_updated FROM repositories WHERE owner = ?1 AND url = ?2",
                params![owner, url],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();

        Ok(stored.and_then(|seconds| DateTime::from_timestamp(seconds, 0)))
    }

    pub fn latest_commit_sha(&self, owner: &str, url: &str) -> Result<Option<String>> {
        let sha = self
            .conn
            .query_row(
                "SELECT c.hash
                 FROM commits c
                 JOIN repositories r ON c.repo_id = r.id
                 WHERE r.owner = ?1 AND r.url = ?2
                 ORDER BY c.date DESC, c.id DESC
                 LIMIT 1",
                params![owner, url],
                |row| row.get(0),
            )
            .optional()?;

        Ok(sha)
    }

    /// Opens the single write transaction used by one sync call.
    pub fn begin_sync(&mut self) -> Result<SyncBatch<'_>> {
        Ok(SyncBatch {
            tx: self.conn.transaction()?,
        })
    }

    /// Commit instants in `[start, end)` and repository names for repositories owned by `owner`.
    pub fn commit_activity(
        &self,
        owner: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CommitActivityRow>> {
        let mut statement = self.conn.prepare(
            "SELECT c.date, r.name
             FROM commits c
             JOIN repositories r ON c.repo_id = r.id
             WHERE r.owner = ?1 AND c.date >= ?2 AND c.date < ?3
             ORDER BY c.date ASC",
        )?;

        let rows = statement
            .query_map(params![owner, start.timestamp(), end.timestamp()], |row| {
                Ok(CommitActivityRow {
                    committed_at: timestamp_column(row, 0)?,
                    repo_name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Distinct commit hashes authored under `user`'s name in the user's repositories.
    pub fn count_commits(
        &self,
        user: &str,
        repo_name: Option<&str>,
        range: &MonthRange,
    ) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(DISTINCT c.hash)
             FROM commits c
             JOIN repositories r ON c.repo_id = r.id
             WHERE r.owner = ?1
             AND (?2 IS NULL OR r.name = ?2)
             AND c.date >= ?3 AND c.date < ?4
             AND c.author = ?1",
            params![user, repo_name, range.start_ts(), range.end_ts()],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    pub fn language_usage(&self, owner: &str, range: &MonthRange) -> Result<Vec<LanguageUsageRow>> {
        let mut statement = self.conn.prepare(
            "SELECT cc.language, COUNT(*) AS count
             FROM code_changes cc
             JOIN commits c ON cc.commit_id = c.id
             JOIN repositories r ON c.repo_id = r.id
             WHERE r.owner = ?1 AND c.date >= ?2 AND c.date < ?3
             GROUP BY cc.language
             ORDER BY count DESC, cc.language ASC",
        )?;

        let rows = statement
            .query_map(params![owner, range.start_ts(), range.end_ts()], |row| {
                Ok(LanguageUsageRow {
                    language: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn commits_by_author(&self, author: &str, range: &MonthRange) -> Result<Vec<CommitRefRow>> {
        let mut statement = self.conn.prepare(
            "SELECT c.id, c.repo_id, r.name
             FROM commits c
             JOIN repositories r ON c.repo_id = r.id
             WHERE c.author = ?1 AND c.date >= ?2 AND c.date < ?3
             ORDER BY c.date DESC, c.id DESC",
        )?;

        let rows = statement
            .query_map(params![author, range.start_ts(), range.end_ts()], |row| {
                Ok(CommitRefRow {
                    commit_id: row.get(0)?,
                    repo_id: row.get(1)?,
                    repo_name: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn commit_changes(&self, commit_id: i64) -> Result<Vec<CommitChangeRow>> {
        let mut statement = self.conn.prepare(
            "SELECT c.message, cc.path, cc.change_type, cc.content
             FROM commits c
             LEFT JOIN code_changes cc ON c.id = cc.commit_id
             WHERE c.id = ?1
             ORDER BY cc.path ASC, cc.id ASC",
        )?;

        let rows = statement
            .query_map(params![commit_id], |row| {
                Ok(CommitChangeRow {
                    message: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    path: row.get(1)?,
                    change_type: row.get(2)?,
                    content: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn upsert_recap(
        &self,
        owner: &str,
        repo_id: i64,
        range: &MonthRange,
        content: &str,
        updated_at: i64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO repo_recaps (owner, repo_id, year, month, content, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(owner, repo_id, year, month)
             DO UPDATE SET content=excluded.content, updated_at=excluded.updated_at",
            params![owner, repo_id, range.year, range.month, content, updated_at],
        )?;

        Ok(())
    }

    pub fn recaps(&self, owner: &str, range: &MonthRange) -> Result<Vec<RecapRow>> {
        let mut statement = self.conn.prepare(
            "SELECT rr.repo_id, r.name, rr.year, rr.month, rr.content, rr.updated_at
             FROM repo_recaps rr
             JOIN repositories r ON rr.repo_id = r.id
             WHERE rr.owner = ?1 AND rr.year = ?2 AND rr.month = ?3
             ORDER BY r.name ASC",
        )?;

        let rows = statement
            .query_map(params![owner, range.year, range.month], |row| {
                Ok(RecapRow {
                    repo_id: row.get(0)?,
                    repo_name: row.get(1)?,
                    year: row.get(2)?,
                    month: row.get(3)?,
                    content: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn table_counts(&self) -> Result<TableCounts> {
        let count = |table: &str| -> Result<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        };

        Ok(TableCounts {
            repositories: count("repositories")?,
            commits: count("commits")?,
            code_changes: count("code_changes")?,
        })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Write side of one sync call. Dropping it without `commit` rolls everything back.
pub struct SyncBatch<'conn> {
    tx: Transaction<'conn>,
}

impl SyncBatch<'_> {
    /// Inserts or refreshes the repository row; the name is never rewritten on conflict.
    pub fn upsert_repository(&self, owner: &str, meta: &RepositoryMeta) -> Result<i64> {
        let id = self.tx.query_row(
            queries::UPSERT_REPOSITORY,
            params![
                owner,
                meta.name,
                meta.html_url,
                meta.updated_at.timestamp(),
                meta.private
            ],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// Inserts the commit or refreshes message and author. The timestamp stays as first written.
    pub fn upsert_commit(&self, repo_id: i64, commit: &CommitRecord) -> Result<i64> {
        let id = self.tx.query_row(
            queries::UPSERT_COMMIT,
            params![
                repo_id,
                commit.sha,
                commit.message,
                commit.committed_at.timestamp(),
                commit.author
            ],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    pub fn insert_file_change(
        &self,
        commit_id: i64,
        change: &FileChangeRecord,
        language: &str,
    ) -> Result<()> {
        self.tx.execute(
            queries::INSERT_CODE_CHANGE,
            params![
                commit_id,
                change.path,
                change.kind.as_str(),
                change.patch,
                change.additions,
                change.deletions,
                change.changes,
                language
            ],
        )?;

        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

fn timestamp_column(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let seconds: i64 = row.get(index)?;
    DateTime::from_timestamp(seconds, 0)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(index, seconds))
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::model::{ChangeKind, CommitRecord, FileChangeRecord, RepositoryMeta};
    use crate::period::MonthRange;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn meta(updated_at: DateTime<Utc>) -> RepositoryMeta {
        RepositoryMeta {
            name: "recap".to_string(),
            html_url: "https://github.com/octo/recap".to_string(),
            private: false,
            updated_at,
            created_at: None,
        }
    }

    fn commit(sha: &str, at: DateTime<Utc>) -> CommitRecord {
        CommitRecord {
            sha: sha.to_string(),
            message: format!("commit {sha}"),
            author: "octo".to_string(),
            committed_at: at,
            files: vec![FileChangeRecord {
                path: "src/main.rs".to_string(),
                kind: ChangeKind::Modified,
                patch: "@@ -1 +1 @@".to_string(),
                additions: 1,
                deletions: 1,
                changes: 2,
            }],
        }
    }

    fn january() -> MonthRange {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date");
        MonthRange::resolve_at(2025, 1, today).expect("valid month")
    }

    #[test]
    fn open_creates_parent_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("recap.db");

        let database = Database::open(&path).expect("database opened");
        let counts = database.table_counts().expect("counts");

        assert!(path.exists());
        assert_eq!(counts.repositories, 0);
    }

    #[test]
    fn dropped_batch_rolls_back() {
        let mut database = Database::open_in_memory().expect("database");
        let updated = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();

        {
            let batch = database.begin_sync().expect("batch");
            batch
                .upsert_repository("octo", &meta(updated))
                .expect("repository upserted");
        }

        assert_eq!(database.table_counts().expect("counts").repositories, 0);
        assert!(
            database
                .repository_last_updated("octo", "https://github.com/octo/recap")
                .expect("lookup")
                .is_none()
        );
    }

    #[test]
    fn latest_sha_follows_commit_date() {
        let mut database = Database::open_in_memory().expect("database");
        let updated = Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap();

        let batch = database.begin_sync().expect("batch");
        let repo_id = batch
            .upsert_repository("octo", &meta(updated))
            .expect("repository");
        batch
            .upsert_commit(repo_id, &commit("bbb", Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap()))
            .expect("commit");
        batch
            .upsert_commit(repo_id, &commit("aaa", Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap()))
            .expect("commit");
        batch.commit().expect("committed");

        let latest = database
            .latest_commit_sha("octo", "https://github.com/octo/recap")
            .expect("lookup");
        assert_eq!(latest.as_deref(), Some("bbb"));
    }

    #[test]
    fn language_usage_orders_by_count() {
        let mut database = Database::open_in_memory().expect("database");
        let updated = Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap();

        let batch = database.begin_sync().expect("batch");
        let repo_id = batch
            .upsert_repository("octo", &meta(updated))
            .expect("repository");
        let record = commit("aaa", Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap());
        let commit_id = batch.upsert_commit(repo_id, &record).expect("commit");
        for language in ["rs", "rs", "toml"] {
            batch
                .insert_file_change(commit_id, &record.files[0], language)
                .expect("change");
        }
        batch.commit().expect("committed");

        let usage = database.language_usage("octo", &january()).expect("usage");
        let pairs = usage
            .iter()
            .map(|row| (row.language.as_str(), row.count))
            .collect::<Vec<_>>();

        assert_eq!(pairs, vec![("rs", 2), ("toml", 1)]);
    }

    #[test]
    fn recap_upsert_keeps_one_row_per_month() {
        let mut database = Database::open_in_memory().expect("database");
        let updated = Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap();

        let batch = database.begin_sync().expect("batch");
        let repo_id = batch
            .upsert_repository("octo", &meta(updated))
            .expect("repository");
        batch.commit().expect("committed");

        let range = january();
        database
            .upsert_recap("octo", repo_id, &range, "first", 1)
            .expect("first recap");
        database
            .upsert_recap("octo", repo_id, &range, "second", 2)
            .expect("second recap");

        let recaps = database.recaps("octo", &range).expect("recaps");
        assert_eq!(recaps.len(), 1);
        assert_eq!(recaps[0].content, "second");
        assert_eq!(recaps[0].updated_at, 2);
        assert_eq!(recaps[0].repo_name, "recap");
    }
}
