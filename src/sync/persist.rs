use crate::db::Database;
use crate::error::{RecapError, Result};
use crate::model::{CommitRecord, RepositoryMeta};
use tracing::{debug, warn};

pub const NO_LANGUAGE: &str = "none";
const MAX_EXTENSION_CHARS: usize = 45;

/// Language token for a changed path: the text after the last `.` of the file name.
pub fn infer_language(path: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);

    file_name
        .rsplit_once('.')
        .map(|(_, extension)| extension)
        .filter(|extension| !extension.is_empty())
        .filter(|extension| extension.chars().count() <= MAX_EXTENSION_CHARS)
        .unwrap_or(NO_LANGUAGE)
        .to_string()
}

/// Writes one repository and its commits in a single transaction.
///
/// File changes are appended without a dedup key, so re-saving a commit that is
/// already stored adds its file changes again. Callers bound the fetch with the
/// newest stored SHA to avoid that.
pub fn save_repository_commits(
    database: &mut Database,
    owner: &str,
    repository: &RepositoryMeta,
    commits: &[CommitRecord],
) -> Result<bool> {
    write_batch(database, owner, repository, commits).map_err(|error| {
        warn!(
            owner,
            repo = %repository.name,
            error = %error,
            "sync batch rolled back"
        );
        RecapError::Persistence(format!("error: {error}"))
    })?;

    Ok(true)
}

fn write_batch(
    database: &mut Database,
    owner: &str,
    repository: &RepositoryMeta,
    commits: &[CommitRecord],
) -> Result<()> {
    let batch = database.begin_sync()?;
    let repo_id = batch.upsert_repository(owner, repository)?;

    commits.iter().try_for_each(|commit| {
        let commit_id = batch.upsert_commit(repo_id, commit)?;
        debug!(sha = %commit.sha, files = commit.files.len(), "commit stored");

        commit.files.iter().try_for_each(|change| {
            batch.insert_file_change(commit_id, change, &infer_language(&change.path))
        })
    })?;

    batch.commit()
}
