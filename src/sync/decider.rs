use crate::db::Database;
use crate::error::{RecapError, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

/// True when nothing is stored yet or the remote timestamp is strictly newer.
pub fn needs_update(stored: Option<DateTime<Utc>>, remote: DateTime<Utc>) -> bool {
    match stored {
        None => true,
        Some(stored) => remote > stored,
    }
}

pub fn check_repository_update(
    database: &Database,
    owner: &str,
    url: &str,
    remote: DateTime<Utc>,
) -> Result<bool> {
    let stored = database.repository_last_updated(owner, url)?;
    Ok(needs_update(stored, remote))
}

/// Parses a GitHub-style timestamp. Inputs without an offset are taken as UTC.
pub fn parse_remote_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();

    DateTime::<FixedOffset>::parse_from_rfc3339(trimmed)
        .map(|parsed| parsed.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
                .map(|naive| naive.and_utc())
        })
        .map_err(|_| RecapError::validation(format!("Invalid timestamp: {raw}")))
}
