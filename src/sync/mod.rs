pub mod decider;
pub mod persist;

use crate::db::Database;
use crate::error::Result;
use crate::model::{CommitRecord, RepositoryMeta};
use crate::period::MonthRange;
use serde::Serialize;
use tracing::info;

pub use decider::check_repository_update;
pub use persist::save_repository_commits;

/// Commits of one repository inside `range`, newest first from the source.
#[derive(Debug, Clone)]
pub struct CommitQuery<'a> {
    pub owner: &'a str,
    pub repo: &'a str,
    pub range: &'a MonthRange,
    /// Stop listing once this commit is reached; it is not returned itself.
    pub since_sha: Option<&'a str>,
}

pub trait CommitFetcher {
    fn fetch_commits(&self, query: &CommitQuery<'_>) -> Result<Vec<CommitRecord>>;
}

#[derive(Debug, Clone)]
pub struct SyncRequest<'a> {
    pub owner: &'a str,
    pub repository: &'a RepositoryMeta,
    pub range: &'a MonthRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    UpToDate,
    Saved { total_commits: usize },
}

pub fn sync_repository<F: CommitFetcher + ?Sized>(
    database: &mut Database,
    fetcher: &F,
    request: &SyncRequest<'_>,
) -> Result<SyncOutcome> {
    let repository = request.repository;

    if !check_repository_update(
        database,
        request.owner,
        &repository.html_url,
        repository.updated_at,
    )? {
        info!(owner = request.owner, repo = %repository.name, "repository already up to date");
        return Ok(SyncOutcome::UpToDate);
    }

    let since_sha = database.latest_commit_sha(request.owner, &repository.html_url)?;
    info!(
        owner = request.owner,
        repo = %repository.name,
        since_sha = since_sha.as_deref().unwrap_or("none"),
        "fetching commits"
    );

    let commits = fetcher.fetch_commits(&CommitQuery {
        owner: request.owner,
        repo: &repository.name,
        range: request.range,
        since_sha: since_sha.as_deref(),
    })?;

    save_repository_commits(database, request.owner, repository, &commits)?;
    info!(
        owner = request.owner,
        repo = %repository.name,
        total_commits = commits.len(),
        "repository saved"
    );

    Ok(SyncOutcome::Saved {
        total_commits: commits.len(),
    })
}
