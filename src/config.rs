use anyhow::{Context, Result, anyhow, bail};
use chrono::FixedOffset;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".gitrecap";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_TIMEZONE: &str = "+09:00";
pub const GITHUB_TOKEN_ENV: &str = "GITRECAP_GITHUB_TOKEN";
pub const AI_API_KEY_ENV: &str = "GITRECAP_AI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub api_port: u16,
    /// Fixed UTC offset every commit is shifted into before it is bucketed by date.
    pub timezone: String,
    pub github_api_base_url: String,
    pub github_token: Option<String>,
    pub github_timeout_seconds: u64,
    pub ai_enabled: bool,
    pub ai_api_key: Option<String>,
    pub ai_api_base_url: String,
    pub ai_model: String,
    pub ai_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            db_path: root.join("db").join("recap.db"),
            api_port: 8000,
            timezone: DEFAULT_TIMEZONE.to_string(),
            github_api_base_url: "https://api.github.com".to_string(),
            github_token: None,
            github_timeout_seconds: 30,
            ai_enabled: true,
            ai_api_key: None,
            ai_api_base_url: "https://api.openai.com/v1".to_string(),
            ai_model: "gpt-4o-mini".to_string(),
            ai_timeout_seconds: 60,
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.zone()?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(config_path)?;

        Ok(())
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        Ok(())
    }

    pub fn zone(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.timezone)
    }

    /// Token from the environment first, then from the config file.
    pub fn resolve_github_token(&self) -> Option<String> {
        std::env::var(GITHUB_TOKEN_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| {
                self.github_token
                    .clone()
                    .filter(|value| !value.trim().is_empty())
            })
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_config_key(key) {
            "db_path" => {
                self.db_path = expand_home(value);
            }
            "api_port" => {
                self.api_port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
            }
            "timezone" => {
                parse_utc_offset(value)?;
                self.timezone = value.trim().to_string();
            }
            "github_api_base_url" => {
                self.github_api_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "github_token" => {
                self.github_token = (!value.trim().is_empty()).then_some(value.trim().to_string());
            }
            "github_timeout_seconds" => {
                self.github_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("github_timeout_seconds must be a number"))?
                    .max(5);
            }
            "ai_enabled" => {
                self.ai_enabled = value
                    .parse::<bool>()
                    .map_err(|_| anyhow!("ai_enabled must be true/false"))?;
            }
            "ai_api_key" => {
                self.ai_api_key = (!value.trim().is_empty()).then_some(value.to_string());
            }
            "ai_api_base_url" => {
                self.ai_api_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "ai_model" => {
                self.ai_model = value.trim().to_string();
            }
            "ai_timeout_seconds" => {
                self.ai_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("ai_timeout_seconds must be a number"))?
                    .max(5);
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: db_path|db.path, api_port|api.port, timezone|stats.timezone, github_api_base_url|github.base_url, github_token|github.token, github_timeout_seconds|github.timeout_seconds, ai_enabled|ai.enabled, ai_api_key|ai.api_key, ai_api_base_url|ai.base_url, ai_model|ai.model, ai_timeout_seconds|ai.timeout_seconds"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "db_path" => Some(self.db_path.display().to_string()),
            "api_port" => Some(self.api_port.to_string()),
            "timezone" => Some(self.timezone.clone()),
            "github_api_base_url" => Some(self.github_api_base_url.clone()),
            "github_token" => Some(mask_secret(self.github_token.as_ref())),
            "github_timeout_seconds" => Some(self.github_timeout_seconds.to_string()),
            "ai_enabled" => Some(self.ai_enabled.to_string()),
            "ai_api_key" => Some(mask_secret(self.ai_api_key.as_ref())),
            "ai_api_base_url" => Some(self.ai_api_base_url.clone()),
            "ai_model" => Some(self.ai_model.clone()),
            "ai_timeout_seconds" => Some(self.ai_timeout_seconds.to_string()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "db_path" | "db.path" => "db_path",
        "api_port" | "api.port" => "api_port",
        "timezone" | "stats.timezone" => "timezone",
        "github_api_base_url" | "github.base_url" => "github_api_base_url",
        "github_token" | "github.token" => "github_token",
        "github_timeout_seconds" | "github.timeout_seconds" => "github_timeout_seconds",
        "ai_enabled" | "ai.enabled" => "ai_enabled",
        "ai_api_key" | "ai.api_key" => "ai_api_key",
        "ai_api_base_url" | "ai.base_url" => "ai_api_base_url",
        "ai_model" | "ai.model" => "ai_model",
        "ai_timeout_seconds" | "ai.timeout_seconds" => "ai_timeout_seconds",
        _ => key,
    }
}

fn mask_secret(value: Option<&String>) -> String {
    value
        .map(|_| "***set***".to_string())
        .unwrap_or_else(|| "not_set".to_string())
}

/// Accepts `Z`, `UTC`, `+09:00`, `-0330` or `+9`.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).context("Failed to build UTC offset");
    }

    let (sign, digits) = match trimmed.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => bail!("Invalid timezone offset: {value}. Example: +09:00"),
    };

    let (hours, minutes) = match digits.split_once(':') {
        Some((hours, minutes)) => (hours, minutes),
        None if digits.len() == 4 => digits
            .split_at_checked(2)
            .with_context(|| format!("Invalid timezone offset: {value}"))?,
        None => (digits, "0"),
    };

    let hours = hours
        .parse::<i32>()
        .with_context(|| format!("Invalid timezone hours: {value}"))?;
    let minutes = minutes
        .parse::<i32>()
        .with_context(|| format!("Invalid timezone minutes: {value}"))?;

    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        bail!("Timezone offset out of range: {value}");
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("Timezone offset out of range: {value}"))
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}
