use crate::config::Config;
use crate::error::{RecapError, Result};
use crate::model::{ChangeKind, CommitRecord, FileChangeRecord, RepositoryMeta};
use crate::period::MonthRange;
use crate::sync::{CommitFetcher, CommitQuery};
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, LINK, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const PER_PAGE: &str = "100";

static NEXT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([^>]+)>\s*;\s*rel="next""#).expect("next link pattern is valid")
});

#[derive(Debug, Deserialize)]
struct ListedCommit {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    sha: String,
    commit: CommitBody,
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    message: String,
    author: Option<GitAuthor>,
    committer: Option<GitAuthor>,
}

#[derive(Debug, Deserialize)]
struct GitAuthor {
    name: String,
    date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    filename: String,
    status: ChangeKind,
    #[serde(default)]
    additions: i64,
    #[serde(default)]
    deletions: i64,
    #[serde(default)]
    changes: i64,
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthenticatedUser {
    login: String,
}

impl CommitDetail {
    fn into_record(self) -> Result<CommitRecord> {
        let CommitBody {
            message,
            author,
            committer,
        } = self.commit;
        let signature = author.or(committer).ok_or_else(|| {
            RecapError::validation(format!("Commit {} has no author signature", self.sha))
        })?;

        Ok(CommitRecord {
            sha: self.sha,
            message,
            author: signature.name,
            committed_at: signature.date,
            files: self
                .files
                .into_iter()
                .map(|file| FileChangeRecord {
                    path: file.filename,
                    kind: file.status,
                    patch: file.patch.unwrap_or_default(),
                    additions: file.additions,
                    deletions: file.deletions,
                    changes: file.changes,
                })
                .collect(),
        })
    }
}

/// Blocking GitHub REST client. Every call is sequential and never retried.
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: Client,
    base_url: String,
}

impl GithubClient {
    pub fn new(config: &Config, token: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(RecapError::validation("GitHub token must be provided"));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("gitrecap"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("token {}", token.trim()))
                .map_err(|_| RecapError::validation("GitHub token contains invalid characters"))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.github_timeout_seconds.max(5)))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.github_api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn authenticated_login(&self) -> Result<String> {
        let response = self.client.get(format!("{}/user", self.base_url)).send()?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(RecapError::validation("GitHub token is invalid or expired"));
        }

        let user: AuthenticatedUser = read_json(response)?;
        Ok(user.login)
    }

    /// Confirms the token belongs to `owner`.
    pub fn verify_owner(&self, owner: &str) -> Result<()> {
        let login = self.authenticated_login()?;
        if login != owner {
            return Err(RecapError::validation(format!(
                "Github username is invalid: token belongs to {login}"
            )));
        }

        Ok(())
    }

    pub fn repository(&self, owner: &str, repo: &str) -> Result<RepositoryMeta> {
        let response = self
            .client
            .get(format!("{}/repos/{owner}/{repo}", self.base_url))
            .send()?;

        read_json(response)
    }

    /// Repositories of the token owner created or updated inside `range`.
    pub fn repositories_in_range(&self, range: &MonthRange) -> Result<Vec<RepositoryMeta>> {
        let first = Url::parse_with_params(
            &format!("{}/user/repos", self.base_url),
            &[
                ("visibility", "all"),
                ("sort", "updated"),
                ("per_page", PER_PAGE),
            ],
        )
        .map_err(|error| RecapError::validation(format!("Invalid GitHub URL: {error}")))?;

        let mut repositories = Vec::new();
        let mut next = Some(first.to_string());

        while let Some(url) = next.take() {
            let response = self.client.get(&url).send()?;
            next = next_page(&response);
            let page: Vec<RepositoryMeta> = read_json(response)?;
            repositories.extend(page);
        }

        Ok(repositories
            .into_iter()
            .filter(|repository| {
                range.contains(repository.updated_at)
                    || repository
                        .created_at
                        .is_some_and(|created_at| range.contains(created_at))
            })
            .collect())
    }

    fn list_commit_shas(&self, query: &CommitQuery<'_>) -> Result<Vec<String>> {
        let first = Url::parse_with_params(
            &format!(
                "{}/repos/{}/{}/commits",
                self.base_url, query.owner, query.repo
            ),
            &[
                ("since", query.range.start.to_rfc3339()),
                ("until", query.range.end.to_rfc3339()),
                ("per_page", PER_PAGE.to_string()),
            ],
        )
        .map_err(|error| RecapError::validation(format!("Invalid GitHub URL: {error}")))?;

        let mut shas = Vec::new();
        let mut next = Some(first.to_string());
        let mut page_number = 0_u32;

        while let Some(url) = next.take() {
            page_number += 1;
            let response = self.client.get(&url).send()?;
            let following = next_page(&response);
            let page: Vec<ListedCommit> = read_json(response)?;
            debug!(repo = query.repo, page = page_number, commits = page.len(), "commit page fetched");

            let (fresh, reached_known) = cut_at_known_sha(page, query.since_sha);
            shas.extend(fresh);

            if !reached_known {
                next = following;
            }
        }

        Ok(shas)
    }

    fn commit_detail(&self, owner: &str, repo: &str, sha: &str) -> Result<CommitRecord> {
        let response = self
            .client
            .get(format!("{}/repos/{owner}/{repo}/commits/{sha}", self.base_url))
            .send()?;
        let detail: CommitDetail = read_json(response)?;

        detail.into_record()
    }
}

impl CommitFetcher for GithubClient {
    fn fetch_commits(&self, query: &CommitQuery<'_>) -> Result<Vec<CommitRecord>> {
        let shas = self.list_commit_shas(query)?;
        info!(repo = query.repo, commits = shas.len(), "fetching commit details");

        shas.iter()
            .enumerate()
            .map(|(index, sha)| {
                debug!(
                    repo = query.repo,
                    sha = &sha[..sha.len().min(7)],
                    progress = %format!("{}/{}", index + 1, shas.len()),
                    "fetching commit detail"
                );
                self.commit_detail(query.owner, query.repo, sha)
            })
            .collect()
    }
}

/// Keeps listed SHAs up to `since_sha`. The flag tells whether it was reached.
fn cut_at_known_sha(page: Vec<ListedCommit>, since_sha: Option<&str>) -> (Vec<String>, bool) {
    let mut fresh = Vec::with_capacity(page.len());

    for listed in page {
        if Some(listed.sha.as_str()) == since_sha {
            return (fresh, true);
        }
        fresh.push(listed.sha);
    }

    (fresh, false)
}

fn next_page(response: &Response) -> Option<String> {
    response
        .headers()
        .get(LINK)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_next_link)
}

fn parse_next_link(header: &str) -> Option<String> {
    header
        .split(',')
        .find_map(|part| NEXT_LINK.captures(part.trim()))
        .map(|captures| captures[1].to_string())
}

fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text()?;

    if !status.is_success() {
        return Err(RecapError::UpstreamFetch {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|error| RecapError::UpstreamFetch {
        status: status.as_u16(),
        body: format!("unexpected payload ({error}): {body}"),
    })
}

#[cfg(test)]
mod tests {
    use super::{CommitDetail, ListedCommit, cut_at_known_sha, parse_next_link};
    use crate::model::{ChangeKind, RepositoryMeta};

    fn listed(shas: &[&str]) -> Vec<ListedCommit> {
        shas.iter()
            .map(|sha| ListedCommit {
                sha: sha.to_string(),
            })
            .collect()
    }

    #[test]
    fn next_link_is_extracted() {
        let header = r#"<https://api.github.com/repositories/1/commits?page=2>; rel="next", <https://api.github.com/repositories/1/commits?page=5>; rel="last""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.github.com/repositories/1/commits?page=2")
        );
    }

    #[test]
    fn last_page_has_no_next_link() {
        let header = r#"<https://api.github.com/repositories/1/commits?page=1>; rel="prev", <https://api.github.com/repositories/1/commits?page=1>; rel="first""#;
        assert!(parse_next_link(header).is_none());
    }

    #[test]
    fn listing_stops_at_known_sha() {
        let (fresh, reached) = cut_at_known_sha(listed(&["c3", "c2", "c1"]), Some("c2"));
        assert_eq!(fresh, vec!["c3".to_string()]);
        assert!(reached);

        let (fresh, reached) = cut_at_known_sha(listed(&["c3", "c2"]), None);
        assert_eq!(fresh.len(), 2);
        assert!(!reached);
    }

    #[test]
    fn commit_detail_becomes_record() {
        let payload = r#"{
            "sha": "0123456789abcdef",
            "commit": {
                "message": "Add parser",
                "author": {"name": "Octo Cat", "email": "octo@example.com", "date": "2025-01-03T10:00:00Z"},
                "committer": {"name": "GitHub", "email": "noreply@github.com", "date": "2025-01-03T10:05:00Z"}
            },
            "files": [
                {"filename": "src/parser.rs", "status": "added", "additions": 10, "deletions": 0, "changes": 10, "patch": "@@ +1,10 @@"},
                {"filename": "logo.png", "status": "modified", "additions": 0, "deletions": 0, "changes": 0}
            ]
        }"#;

        let detail: CommitDetail = serde_json::from_str(payload).expect("detail parsed");
        let record = detail.into_record().expect("record");

        assert_eq!(record.author, "Octo Cat");
        assert_eq!(record.committed_at.to_rfc3339(), "2025-01-03T10:00:00+00:00");
        assert_eq!(record.files.len(), 2);
        assert_eq!(record.files[0].kind, ChangeKind::Added);
        assert_eq!(record.files[1].patch, "");
    }

    #[test]
    fn repository_payload_parses() {
        let payload = r#"{
            "name": "recap",
            "html_url": "https://github.com/octo/recap",
            "private": true,
            "updated_at": "2025-01-20T03:00:00Z",
            "created_at": "2024-11-02T03:00:00Z",
            "stargazers_count": 3
        }"#;

        let repository: RepositoryMeta = serde_json::from_str(payload).expect("repository parsed");
        assert!(repository.private);
        assert!(repository.created_at.is_some());
    }
}
