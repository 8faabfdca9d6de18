pub mod prompt;

use crate::config::{AI_API_KEY_ENV, Config};
use crate::db::Database;
use crate::error::{RecapError, Result};
use crate::period::MonthRange;
use chrono::Utc;
use prompt::{Role, build_commit_prompt};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// Opaque text-to-text completion used for commit summaries.
pub trait Summarizer {
    fn complete(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoRecap {
    pub repo_name: String,
    pub commits: usize,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: Client,
    endpoint: String,
    model: String,
}

impl ChatCompletionClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        if !config.ai_enabled {
            return Err(RecapError::Summary("AI feature is disabled".to_string()));
        }

        let api_key = resolve_api_key(config).ok_or_else(|| {
            RecapError::Summary(format!(
                "AI API key is missing. Set `gitrecap config set ai.api_key <KEY>` or `{AI_API_KEY_ENV}`."
            ))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| RecapError::Summary("Failed to build Authorization header".to_string()))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.ai_timeout_seconds.max(5)))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.ai_api_base_url.trim_end_matches('/')),
            model: config.ai_model.clone(),
        })
    }
}

impl Summarizer for ChatCompletionClient {
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request_body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ]
        });

        let response = self.client.post(&self.endpoint).json(&request_body).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(RecapError::Summary(format!("AI API error {status}: {body}")));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|error| RecapError::Summary(format!("Failed to parse AI response: {error}")))?;

        parsed
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| RecapError::Summary("AI response did not include message.content".to_string()))
    }
}

pub fn has_api_key(config: &Config) -> bool {
    resolve_api_key(config).is_some()
}

fn resolve_api_key(config: &Config) -> Option<String> {
    std::env::var(AI_API_KEY_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            config
                .ai_api_key
                .clone()
                .filter(|value| !value.trim().is_empty())
        })
}

pub fn test_connection(summarizer: &dyn Summarizer) -> Result<String> {
    summarizer.complete(
        "Return exactly one short sentence indicating AI API connectivity is healthy.",
        "Health check for gitrecap.",
    )
}

/// Builds one recap per repository from the user's commits in `range` and stores it.
pub fn summarize_month(
    database: &Database,
    summarizer: &dyn Summarizer,
    owner: &str,
    range: &MonthRange,
) -> Result<Vec<RepoRecap>> {
    let commits = database.commits_by_author(owner, range)?;

    let mut prompts_by_repo: BTreeMap<(String, i64), Vec<String>> = BTreeMap::new();
    for commit in commits {
        let changes = database.commit_changes(commit.commit_id)?;
        let Some(prompt) = build_commit_prompt(&commit.repo_name, &changes) else {
            warn!(commit_id = commit.commit_id, "commit has no stored changes, skipping");
            continue;
        };
        prompts_by_repo
            .entry((commit.repo_name, commit.repo_id))
            .or_default()
            .push(prompt);
    }

    prompts_by_repo
        .into_iter()
        .map(|((repo_name, repo_id), prompts)| -> Result<RepoRecap> {
            let human_input = prompts.join("\n");
            let sections = Role::ALL
                .iter()
                .map(|role| {
                    summarizer
                        .complete(role.system_prompt(), &human_input)
                        .map(|answer| format!("## {}\n{answer}", role.title()))
                })
                .collect::<Result<Vec<_>>>()?;
            let content = sections.join("\n\n");

            database.upsert_recap(owner, repo_id, range, &content, Utc::now().timestamp())?;
            info!(owner, repo = %repo_name, commits = prompts.len(), "recap stored");

            Ok(RepoRecap {
                repo_name,
                commits: prompts.len(),
                content,
            })
        })
        .collect()
}
