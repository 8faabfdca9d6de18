mod api;
mod cli;
mod config;
mod db;
mod error;
mod github;
mod model;
mod period;
mod stats;
mod summary;
mod sync;

use crate::cli::{AiCommands, Cli, Commands, ConfigCommands};
use crate::config::{Config, GITHUB_TOKEN_ENV};
use crate::db::Database;
use crate::error::RecapError;
use crate::github::GithubClient;
use crate::period::MonthRange;
use crate::stats::MonthlyActivity;
use crate::summary::ChatCompletionClient;
use crate::sync::{SyncOutcome, SyncRequest, sync_repository};
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => handle_serve().await,
        Commands::Sync {
            owner,
            repo,
            year,
            month,
            token,
        } => handle_sync(owner, repo, year, month, token).await,
        Commands::Stats {
            owner,
            year,
            month,
            cutoff_day,
        } => handle_stats(&owner, year, month, cutoff_day),
        Commands::Summarize { owner, year, month } => handle_summarize(owner, year, month).await,
        Commands::Config { command } => handle_config_command(command),
        Commands::Status => handle_status(),
        Commands::Doctor => handle_doctor(),
        Commands::Ai { command } => handle_ai_command(command).await,
    }
}

async fn handle_serve() -> Result<()> {
    let config = load_or_default_config()?;
    config.ensure_bootstrap_files()?;
    config.zone()?;
    Database::open(&config.db_path)?;

    api::run_server(Arc::new(config)).await
}

async fn handle_sync(
    owner: String,
    repo: String,
    year: i32,
    month: u32,
    token: Option<String>,
) -> Result<()> {
    let config = load_or_default_config()?;
    config.ensure_bootstrap_files()?;
    let range = MonthRange::resolve(year, month)?;
    let token = token
        .filter(|value| !value.trim().is_empty())
        .or_else(|| config.resolve_github_token())
        .with_context(|| {
            format!("GitHub token is missing. Pass --token, set {GITHUB_TOKEN_ENV} or `gitrecap config set github.token <TOKEN>`.")
        })?;

    let (name, outcome) = tokio::task::spawn_blocking(move || {
        let client = GithubClient::new(&config, &token)?;
        client.verify_owner(&owner)?;
        let repository = client.repository(&owner, &repo)?;

        let mut database = Database::open(&config.db_path)?;
        let outcome = sync_repository(&mut database, &client, &SyncRequest {
            owner: &owner,
            repository: &repository,
            range: &range,
        })?;

        Ok::<_, RecapError>((repository.name, outcome))
    })
    .await
    .context("sync task failed")??;

    match outcome {
        SyncOutcome::UpToDate => println!("'{name}' is already up to date!"),
        SyncOutcome::Saved { total_commits } => {
            println!("'{name}' is saved! ({total_commits} commit(s) fetched)")
        }
    }

    Ok(())
}

fn handle_stats(owner: &str, year: i32, month: u32, cutoff_day: Option<u32>) -> Result<()> {
    let config = load_or_default_config()?;
    let range = MonthRange::resolve(year, month)?;
    let cutoff = range.day(cutoff_day.unwrap_or_else(|| range.days_in_month()))?;
    let zone = config.zone()?;

    let database = Database::open(&config.db_path)?;
    let activity = MonthlyActivity::load(&database, owner, &range, zone)?;
    let summary = activity.summary(cutoff);
    let total_commits = stats::commit_count(&database, owner, None, &range)?;
    let languages = stats::language_usage(&database, owner, &range)?;

    let report = json!({
        "owner": owner,
        "timezone": config.timezone,
        "total_commits": total_commits,
        "used_language": languages,
        "summary": summary,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to render statistics")?
    );

    Ok(())
}

async fn handle_summarize(owner: String, year: i32, month: u32) -> Result<()> {
    let config = load_or_default_config()?;
    let range = MonthRange::resolve(year, month)?;

    let recaps = tokio::task::spawn_blocking(move || {
        let summarizer = ChatCompletionClient::from_config(&config)?;
        let database = Database::open(&config.db_path)?;
        summary::summarize_month(&database, &summarizer, &owner, &range)
    })
    .await
    .context("summary task failed")??;

    if recaps.is_empty() {
        println!("No commits with stored changes for {year}-{month:02}");
        return Ok(());
    }

    for recap in recaps {
        println!("# {} ({} commit(s))", recap.repo_name, recap.commits);
        println!("{}\n", recap.content);
    }

    Ok(())
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            let masked = if key.contains("api_key") || key.contains("token") {
                "***hidden***".to_string()
            } else {
                value
            };
            println!("Config saved: {key} = {masked}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_status() -> Result<()> {
    let config = load_config()?;
    let database = Database::open(&config.db_path)?;
    let counts = database.table_counts()?;

    println!("gitrecap status");
    println!("- config: {}", Config::config_path()?.display());
    println!("- database: {}", config.db_path.display());
    println!("- timezone: {}", config.timezone);
    println!("- api_port: {}", config.api_port);
    println!("- repositories: {}", counts.repositories);
    println!("- commits: {}", counts.commits);
    println!("- code_changes: {}", counts.code_changes);

    Ok(())
}

fn handle_doctor() -> Result<()> {
    let config_path = Config::config_path()?;
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!("[WARN] config.json not found: {}", config_path.display());
        issues.push("config missing".to_string());
    }

    let config = load_or_default_config()?;

    match Database::open(&config.db_path) {
        Ok(_) => println!("[OK] SQLite reachable: {}", config.db_path.display()),
        Err(error) => {
            println!("[WARN] SQLite check failed: {error}");
            issues.push("db unreachable".to_string());
        }
    }

    match config.zone() {
        Ok(zone) => println!("[OK] timezone offset valid: {zone}"),
        Err(error) => {
            println!("[WARN] invalid timezone setting: {error}");
            issues.push("invalid timezone".to_string());
        }
    }

    if config.resolve_github_token().is_some() {
        println!("[OK] GitHub token is configured");
    } else {
        println!("[WARN] GitHub token missing (CLI sync needs --token or {GITHUB_TOKEN_ENV})");
        issues.push("github token missing".to_string());
    }

    if config.ai_enabled {
        if summary::has_api_key(&config) {
            println!("[OK] AI API key is configured");
        } else {
            println!("[WARN] AI is enabled but API key is missing");
            issues.push("ai api key missing".to_string());
        }
    } else {
        println!("[OK] AI feature disabled");
    }

    if issues.is_empty() {
        println!("doctor result: no issues");
    } else {
        println!("doctor result: {} warning(s)", issues.len());
    }

    Ok(())
}

async fn handle_ai_command(command: AiCommands) -> Result<()> {
    match command {
        AiCommands::Test {
            key,
            base_url,
            model,
        } => {
            let mut config = load_or_default_config()?;

            if let Some(value) = key {
                config.ai_api_key = Some(value);
            }
            if let Some(value) = base_url {
                config.ai_api_base_url = value;
            }
            if let Some(value) = model {
                config.ai_model = value;
            }

            let response = tokio::task::spawn_blocking(move || {
                let client = ChatCompletionClient::from_config(&config)?;
                summary::test_connection(&client)
            })
            .await
            .context("AI test task failed")??;

            println!("AI API connection successful");
            println!("{response}");

            Ok(())
        }
    }
}

fn load_or_default_config() -> Result<Config> {
    if Config::config_path()?.exists() {
        return Config::load();
    }

    let config = Config::default();
    config.ensure_bootstrap_files()?;
    config.save()?;
    Ok(config)
}

fn load_config() -> Result<Config> {
    Config::load().with_context(|| {
        "Config file not found. Run `gitrecap config set <key> <value>` first.".to_string()
    })
}
