use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

const ENV_FILE: &str = ".env";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub leagues: LeaguesConfig,
    pub jsonodds_feed: JsonOddsFeedConfig,
    pub odds_api_feed: OddsApiFeedConfig,
    pub score_feed: ScoreFeedConfig,
    pub credit: CreditConfig,
    /// Path to the canonical team seed file (JSON).
    pub teams_file: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LeaguesConfig {
    #[serde(default)]
    pub nfl: bool,
    #[serde(default)]
    pub nba: bool,
    #[serde(default)]
    pub mlb: bool,
}

impl Default for LeaguesConfig {
    fn default() -> Self {
        Self {
            nfl: true,
            nba: false,
            mlb: false,
        }
    }
}

impl LeaguesConfig {
    /// Return the list of enabled league keys.
    pub fn enabled_keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.nfl { out.push("nfl".to_string()); }
        if self.nba { out.push("nba".to_string()); }
        if self.mlb { out.push("mlb".to_string()); }
        out
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct JsonOddsFeedConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OddsApiFeedConfig {
    pub base_url: String,
    /// Comma-separated bookmaker keys, highest priority first.
    pub bookmakers: String,
    pub quota_warning_threshold: Option<u64>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl OddsApiFeedConfig {
    pub fn bookmaker_priority(&self) -> Vec<String> {
        self.bookmakers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoreFeedConfig {
    pub espn_api_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CreditConfig {
    pub base_credit_limit_cents: u64,
}

fn default_request_timeout() -> u64 { 5000 }

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| "Failed to parse config TOML")?;
        Ok(config)
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        // Strip BOM if present (common on Windows-created files)
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for line in content.lines() {
            let line = line.trim().trim_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }

    pub fn jsonodds_api_key() -> Result<String> {
        api_key_from_env("JSONODDS_API_KEY")
    }

    pub fn odds_api_key() -> Result<String> {
        api_key_from_env("ODDS_API_KEY")
    }
}

fn api_key_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(sanitize_key(&key)),
        _ => bail!("{var} is not set (put it in the environment or {ENV_FILE})"),
    }
}

/// Strip whitespace and stray quotes that tend to sneak in via copy-paste.
fn sanitize_key(raw: &str) -> String {
    raw.trim().trim_matches('"').trim_matches('\'').to_string()
}
