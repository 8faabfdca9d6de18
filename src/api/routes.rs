use crate::config::Config;
use crate::db::{Database, LanguageUsageRow, RecapRow};
use crate::error::{RecapError, Result};
use crate::github::GithubClient;
use crate::model::RepositoryMeta;
use crate::period::MonthRange;
use crate::stats::{self, calendar::DayCount};
use crate::summary::{self, ChatCompletionClient, RepoRecap};
use crate::sync::{SyncOutcome, SyncRequest, sync_repository};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

const TOKEN_HEADER: &str = "x-github-token";

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/get/:user/repo/:year/:month", get(repositories))
        .route("/get/:user/commit_num/total", get(commit_num_total))
        .route("/get/:user/commit_num/specific", get(commit_num_specific))
        .route("/get/:user/used_language", get(used_language))
        .route("/get/:user/days/active/:year/:month", get(active_days))
        .route(
            "/get/:user/days/longest_streak/:year/:month",
            get(longest_streak),
        )
        .route(
            "/get/:user/days/longest_gap/:year/:month/:day",
            get(longest_gap),
        )
        .route("/get/days/total/:year/:month", get(total_days))
        .route("/get/:user/days/each/:year/:month", get(each_day_commit_count))
        .route("/save/:user/specific/:year/:month", post(save_specific))
        .route("/summary/:user/:year/:month", get(recaps).post(summarize))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct MonthQuery {
    year: Option<i32>,
    month: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SpecificRepoQuery {
    repo_name: Option<String>,
    year: Option<i32>,
    month: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SaveRequestBody {
    repository: RepositoryMeta,
}

#[derive(Debug, Serialize)]
struct SavePayload {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_commits: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ActiveDaysPayload {
    active_days: (u32, u32),
}

#[derive(Debug, Serialize)]
struct LongestStreakPayload {
    longest_streak: u32,
}

#[derive(Debug, Serialize)]
struct LongestGapPayload {
    longest_gap: i64,
}

#[derive(Debug, Serialize)]
struct TotalDaysPayload {
    total_days: u32,
}

#[derive(Debug, Serialize)]
struct EachDayPayload {
    each_day_commit_count: Vec<DayCount>,
}

#[derive(Debug, Serialize)]
struct RecapsPayload<T> {
    year: i32,
    month: u32,
    recaps: Vec<T>,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "message": "working!" }))
}

async fn repositories(
    State(state): State<ApiState>,
    Path((user, year, month)): Path<(String, i32, u32)>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<RepositoryMeta>>> {
    let range = MonthRange::resolve(year, month)?;
    let token = require_token(&headers)?;

    let repositories = run_blocking(move || {
        let client = GithubClient::new(&state.config, &token)?;
        client.verify_owner(&user)?;
        client.repositories_in_range(&range)
    })
    .await?;

    Ok(Json(repositories))
}

async fn commit_num_total(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Query(query): Query<MonthQuery>,
) -> ApiResult<Json<i64>> {
    let range = resolve_optional(query.year, query.month)?;

    let count = run_blocking(move || {
        let database = Database::open(&state.config.db_path)?;
        stats::commit_count(&database, &user, None, &range)
    })
    .await?;

    Ok(Json(count))
}

async fn commit_num_specific(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Query(query): Query<SpecificRepoQuery>,
) -> ApiResult<Json<i64>> {
    let range = resolve_optional(query.year, query.month)?;
    let repo_name = query
        .repo_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| RecapError::validation("repo_name must be provided"))?;

    let count = run_blocking(move || {
        let database = Database::open(&state.config.db_path)?;
        stats::commit_count(&database, &user, Some(&repo_name), &range)
    })
    .await?;

    Ok(Json(count))
}

async fn used_language(
    State(state): State<ApiState>,
    Path(user): Path<String>,
    Query(query): Query<MonthQuery>,
) -> ApiResult<Json<Vec<LanguageUsageRow>>> {
    let range = resolve_optional(query.year, query.month)?;

    let usage = run_blocking(move || {
        let database = Database::open(&state.config.db_path)?;
        stats::language_usage(&database, &user, &range)
    })
    .await?;

    Ok(Json(usage))
}

async fn active_days(
    State(state): State<ApiState>,
    Path((user, year, month)): Path<(String, i32, u32)>,
) -> ApiResult<Json<ActiveDaysPayload>> {
    let range = MonthRange::resolve(year, month)?;
    let zone = state.config.zone()?;

    let active = run_blocking(move || {
        let database = Database::open(&state.config.db_path)?;
        stats::active_days(&database, &user, &range, zone)
    })
    .await?;

    Ok(Json(ActiveDaysPayload {
        active_days: (active.active_days, active.total_days),
    }))
}

async fn longest_streak(
    State(state): State<ApiState>,
    Path((user, year, month)): Path<(String, i32, u32)>,
) -> ApiResult<Json<LongestStreakPayload>> {
    let range = MonthRange::resolve(year, month)?;
    let zone = state.config.zone()?;

    let longest_streak = run_blocking(move || {
        let database = Database::open(&state.config.db_path)?;
        stats::longest_streak(&database, &user, &range, zone)
    })
    .await?;

    Ok(Json(LongestStreakPayload { longest_streak }))
}

async fn longest_gap(
    State(state): State<ApiState>,
    Path((user, year, month, day)): Path<(String, i32, u32, u32)>,
) -> ApiResult<Json<LongestGapPayload>> {
    let range = MonthRange::resolve(year, month)?;
    range.day(day)?;
    let zone = state.config.zone()?;

    let longest_gap = run_blocking(move || {
        let database = Database::open(&state.config.db_path)?;
        stats::longest_gap(&database, &user, &range, day, zone)
    })
    .await?;

    Ok(Json(LongestGapPayload { longest_gap }))
}

async fn total_days(Path((year, month)): Path<(i32, u32)>) -> ApiResult<Json<TotalDaysPayload>> {
    let range = MonthRange::resolve(year, month)?;

    Ok(Json(TotalDaysPayload {
        total_days: range.days_in_month(),
    }))
}

async fn each_day_commit_count(
    State(state): State<ApiState>,
    Path((user, year, month)): Path<(String, i32, u32)>,
) -> ApiResult<Json<EachDayPayload>> {
    let range = MonthRange::resolve(year, month)?;
    let zone = state.config.zone()?;

    let each_day_commit_count = run_blocking(move || {
        let database = Database::open(&state.config.db_path)?;
        stats::daily_commit_counts(&database, &user, &range, zone)
    })
    .await?;

    Ok(Json(EachDayPayload {
        each_day_commit_count,
    }))
}

async fn save_specific(
    State(state): State<ApiState>,
    Path((user, year, month)): Path<(String, i32, u32)>,
    headers: HeaderMap,
    Json(body): Json<SaveRequestBody>,
) -> ApiResult<Response> {
    let range = MonthRange::resolve(year, month)?;
    let token = require_token(&headers)?;
    let repository = body.repository;
    let name = repository.name.clone();

    let outcome = run_blocking(move || {
        let client = GithubClient::new(&state.config, &token)?;
        client.verify_owner(&user)?;

        let mut database = Database::open(&state.config.db_path)?;
        sync_repository(&mut database, &client, &SyncRequest {
            owner: &user,
            repository: &repository,
            range: &range,
        })
    })
    .await;

    let (status, payload) = save_payload(&name, outcome)?;
    Ok((status, Json(payload)).into_response())
}

/// Turns a sync result into the save response. Validation errors stay as `ApiError`.
fn save_payload(
    name: &str,
    outcome: ApiResult<SyncOutcome>,
) -> ApiResult<(StatusCode, SavePayload)> {
    let answer = match outcome {
        Ok(SyncOutcome::UpToDate) => (StatusCode::OK, SavePayload {
            success: true,
            message: format!("'{name}' is already up to date!"),
            total_commits: None,
        }),
        Ok(SyncOutcome::Saved { total_commits }) => (StatusCode::OK, SavePayload {
            success: true,
            message: format!("'{name}' is saved!"),
            total_commits: Some(total_commits),
        }),
        Err(ApiError::Upstream { status, body }) => (StatusCode::BAD_GATEWAY, SavePayload {
            success: false,
            message: format!("Error getting commits for {name}: ({status}, {body})"),
            total_commits: None,
        }),
        Err(ApiError::Internal(error)) => (StatusCode::INTERNAL_SERVER_ERROR, SavePayload {
            success: false,
            message: format!("Failed to save '{name}': {error}"),
            total_commits: None,
        }),
        Err(other) => return Err(other),
    };

    Ok(answer)
}

async fn summarize(
    State(state): State<ApiState>,
    Path((user, year, month)): Path<(String, i32, u32)>,
) -> ApiResult<Json<RecapsPayload<RepoRecap>>> {
    let range = MonthRange::resolve(year, month)?;

    let recaps = run_blocking(move || {
        let summarizer = ChatCompletionClient::from_config(&state.config)?;
        let database = Database::open(&state.config.db_path)?;
        summary::summarize_month(&database, &summarizer, &user, &range)
    })
    .await?;

    Ok(Json(RecapsPayload {
        year,
        month,
        recaps,
    }))
}

async fn recaps(
    State(state): State<ApiState>,
    Path((user, year, month)): Path<(String, i32, u32)>,
) -> ApiResult<Json<RecapsPayload<RecapRow>>> {
    let range = MonthRange::resolve(year, month)?;

    let recaps = run_blocking(move || {
        let database = Database::open(&state.config.db_path)?;
        database.recaps(&user, &range)
    })
    .await?;

    Ok(Json(RecapsPayload {
        year,
        month,
        recaps,
    }))
}

fn resolve_optional(year: Option<i32>, month: Option<u32>) -> Result<MonthRange> {
    match (year, month) {
        (Some(year), Some(month)) => MonthRange::resolve(year, month),
        _ => Err(RecapError::validation("Year and month must be provided")),
    }
}

fn require_token(headers: &HeaderMap) -> Result<String> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| RecapError::validation("GitHub token must be provided"))
}

/// Storage and GitHub calls block, so they run off the async workers.
async fn run_blocking<T, F>(task: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|error| ApiError::Internal(anyhow::anyhow!("blocking task failed: {error}")))?
        .map_err(ApiError::from)
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
enum ApiError {
    Validation(String),
    Upstream { status: u16, body: String },
    Internal(anyhow::Error),
}

impl From<RecapError> for ApiError {
    fn from(value: RecapError) -> Self {
        match value {
            RecapError::Validation(message) => Self::Validation(message),
            RecapError::UpstreamFetch { status, body } => Self::Upstream { status, body },
            other => Self::Internal(other.into()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": message })),
            )
                .into_response(),
            ApiError::Upstream { status, body } => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "GitHub request failed", "status": status, "body": body })),
            )
                .into_response(),
            ApiError::Internal(error) => {
                error!(error = %error, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": error.to_string() })),
                )
                    .into_response()
            }
        }
    }
}
