pub const CREATE_REPOSITORIES: &str = r#"
CREATE TABLE IF NOT EXISTS repositories (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  owner        TEXT NOT NULL,
  name         TEXT NOT NULL,
  url          TEXT NOT NULL,
  last_updated INTEGER,
  is_private   INTEGER NOT NULL DEFAULT 0,
  UNIQUE(owner, url)
);
"#;

pub const CREATE_COMMITS: &str = r#"
CREATE TABLE IF NOT EXISTS commits (
  id      INTEGER PRIMARY KEY AUTOINCREMENT,
  repo_id INTEGER NOT NULL REFERENCES repositories(id),
  hash    TEXT NOT NULL,
  message TEXT,
  date    INTEGER NOT NULL,
  author  TEXT,
  UNIQUE(repo_id, hash)
);
"#;

pub const CREATE_CODE_CHANGES: &str = r#"
CREATE TABLE IF NOT EXISTS code_changes (
  id          INTEGER PRIMARY KEY AUTOINCREMENT,
  commit_id   INTEGER NOT NULL REFERENCES commits(id),
  path        TEXT NOT NULL,
  change_type TEXT NOT NULL,
  content     TEXT,
  additions   INTEGER NOT NULL DEFAULT 0,
  deletions   INTEGER NOT NULL DEFAULT 0,
  changes     INTEGER NOT NULL DEFAULT 0,
  language    TEXT NOT NULL DEFAULT 'none'
);
"#;

pub const CREATE_REPO_RECAPS: &str = r#"
CREATE TABLE IF NOT EXISTS repo_recaps (
  id         INTEGER PRIMARY KEY AUTOINCREMENT,
  owner      TEXT NOT NULL,
  repo_id    INTEGER NOT NULL REFERENCES repositories(id),
  year       INTEGER NOT NULL,
  month      INTEGER NOT NULL,
  content    TEXT NOT NULL,
  updated_at INTEGER NOT NULL,
  UNIQUE(owner, repo_id, year, month)
);
"#;

pub const INDEX_COMMITS_DATE: &str =
    "CREATE INDEX IF NOT EXISTS idx_commits_date ON commits(date);";

pub const INDEX_CODE_CHANGES_COMMIT: &str =
    "CREATE INDEX IF NOT EXISTS idx_code_changes_commit_id ON code_changes(commit_id);";

pub const UPSERT_REPOSITORY: &str = "INSERT INTO repositories (owner, name, url, last_updated, is_private)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT(owner, url)
     DO UPDATE SET last_updated=excluded.last_updated, is_private=excluded.is_private
     RETURNING id";

pub const UPSERT_COMMIT: &str = "INSERT INTO commits (repo_id, hash, message, date, author)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT(repo_id, hash)
     DO UPDATE SET message=excluded.message, author=excluded.author
     RETURNING id";

pub const INSERT_CODE_CHANGE: &str = "INSERT INTO code_changes
     (commit_id, path, change_type, content, additions, deletions, changes, language)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_REPOSITORIES,
        CREATE_COMMITS,
        CREATE_CODE_CHANGES,
        CREATE_REPO_RECAPS,
        INDEX_COMMITS_DATE,
        INDEX_CODE_CHANGES_COMMIT,
    ]
}
