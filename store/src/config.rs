use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Defaults ────────────────────────────────────────────────────────────

/// Document store relative to home.
const DEFAULT_DB_REL: &str = ".slack-analytics/slack-analytics.db";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_OPENAI_MODEL: &str = "gpt-4";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LOOKBACK_HOURS: u64 = 24;
const DEFAULT_INTERVAL_SECS: u64 = 3600;
const DEFAULT_PAGE_SIZE: usize = 20;

/// Key files consulted when `OPENAI_API_KEY` is unset.
const OPENAI_KEY_FILES: &[&str] = &[
    "~/.config/openai/api_key",
    "~/.config/openai/key",
    "~/.openai/api_key",
];

// ── Config struct ───────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct InsightsConfig {
    pub db_path: PathBuf,
    pub bind_addr: String,
    pub slack_signing_secret: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub lookback: Duration,
    pub analysis_interval: Duration,
    pub page_size: usize,
}

impl InsightsConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::from_lookup(|key| env::var(key).ok())?;
        if config.openai_api_key.is_none() {
            config.openai_api_key = read_key_file();
        }
        Ok(config)
    }

    /// Builds the config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_path = match get("INSIGHTS_DB_PATH") {
            Some(raw) => expand_path(&raw),
            None => dirs::home_dir()
                .context("could not resolve home directory")?
                .join(DEFAULT_DB_REL),
        };

        let bind_addr = get("INSIGHTS_BIND").unwrap_or_else(|| {
            let port = parse_or(get("PORT"), DEFAULT_PORT);
            format!("0.0.0.0:{port}")
        });

        Ok(Self {
            db_path,
            bind_addr,
            slack_signing_secret: get("SLACK_SIGNING_SECRET"),
            openai_api_key: get("OPENAI_API_KEY").map(|k| k.trim().to_string()),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            lookback: Duration::from_secs(
                parse_or(get("ANALYSIS_LOOKBACK_HOURS"), DEFAULT_LOOKBACK_HOURS).saturating_mul(3600),
            ),
            analysis_interval: Duration::from_secs(parse_or(
                get("ANALYSIS_INTERVAL_SECS"),
                DEFAULT_INTERVAL_SECS,
            )),
            page_size: parse_or(get("INSIGHTS_PAGE_SIZE"), DEFAULT_PAGE_SIZE),
        })
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

fn read_key_file() -> Option<String> {
    OPENAI_KEY_FILES.iter().find_map(|path| {
        let expanded = expand_path(path);
        read_trimmed(&expanded)
    })
}

fn read_trimmed(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let trimmed = content.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
