use std::env;
use std::num::NonZeroU32;

use crate::error::AppError;

/// LLM provider settings. `None` when no endpoint is configured, which
/// disables the AI tier entirely (rule-based tips still run).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_secs: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub riot_api_key: String,
    pub discord_bot_token: String,
    pub database_url: String,
    pub sync_interval_secs: u64,
    pub sync_match_count: u32,
    pub sync_workers: usize,
    pub riot_rate_limit_per_minute: NonZeroU32,
    pub discord_rate_limit_count: NonZeroU32,
    pub discord_rate_limit_window_secs: u64,
    pub llm: Option<LlmConfig>,
    pub weekly_summary_day: chrono::Weekday,
    pub weekly_summary_hour: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
        const DEFAULT_SYNC_MATCH_COUNT: u32 = 20;
        const DEFAULT_SYNC_WORKERS: usize = 4;
        const DEFAULT_RIOT_RATE_LIMIT_PER_MINUTE: u32 = 100;
        const DEFAULT_DISCORD_RATE_LIMIT_COUNT: u32 = 10;
        const DEFAULT_DISCORD_RATE_LIMIT_WINDOW_SECS: u64 = 10;
        const DEFAULT_LLM_MODEL: &str = "deepseek-chat";
        const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
        const DEFAULT_LLM_RETRIES: u32 = 1;
        const DEFAULT_LLM_RETRY_BACKOFF_SECS: f64 = 1.5;
        const DEFAULT_LLM_MAX_TOKENS: u32 = 1500;
        const DEFAULT_WEEKLY_SUMMARY_HOUR: u32 = 9;

        let riot_api_key = env::var("RIOT_API_KEY")
            .map_err(|_| AppError::Config("RIOT_API_KEY must be set".into()))?;

        let discord_bot_token = env::var("DISCORD_BOT_TOKEN")
            .map_err(|_| AppError::Config("DISCORD_BOT_TOKEN must be set".into()))?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:coach.db".into());

        let sync_interval_secs = parse_var("SYNC_INTERVAL_SECS", DEFAULT_SYNC_INTERVAL_SECS);
        let sync_match_count = parse_var("SYNC_MATCH_COUNT", DEFAULT_SYNC_MATCH_COUNT);
        let sync_workers = parse_var("SYNC_WORKERS", DEFAULT_SYNC_WORKERS).max(1);

        let riot_rate_limit_per_minute =
            parse_nonzero("RIOT_RATE_LIMIT_PER_MINUTE", DEFAULT_RIOT_RATE_LIMIT_PER_MINUTE);
        let discord_rate_limit_count =
            parse_nonzero("DISCORD_RATE_LIMIT_COUNT", DEFAULT_DISCORD_RATE_LIMIT_COUNT);
        let discord_rate_limit_window_secs = parse_var(
            "DISCORD_RATE_LIMIT_WINDOW_SECS",
            DEFAULT_DISCORD_RATE_LIMIT_WINDOW_SECS,
        );

        let llm = match env::var("LLM_API_URL") {
            Ok(api_url) if !api_url.trim().is_empty() => Some(LlmConfig {
                api_url,
                api_key: env::var("LLM_API_KEY").unwrap_or_default(),
                model: env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.into()),
                timeout_secs: parse_var("LLM_TIMEOUT_SECS", DEFAULT_LLM_TIMEOUT_SECS),
                retries: parse_var("LLM_RETRIES", DEFAULT_LLM_RETRIES),
                retry_backoff_secs: parse_var(
                    "LLM_RETRY_BACKOFF_SECS",
                    DEFAULT_LLM_RETRY_BACKOFF_SECS,
                ),
                max_tokens: parse_var("LLM_MAX_TOKENS", DEFAULT_LLM_MAX_TOKENS),
            }),
            _ => None,
        };

        let weekly_summary_day = env::var("WEEKLY_SUMMARY_DAY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(chrono::Weekday::Mon);

        let weekly_summary_hour =
            parse_var("WEEKLY_SUMMARY_HOUR", DEFAULT_WEEKLY_SUMMARY_HOUR).min(23);

        Ok(Self {
            riot_api_key,
            discord_bot_token,
            database_url,
            sync_interval_secs,
            sync_match_count,
            sync_workers,
            riot_rate_limit_per_minute,
            discord_rate_limit_count,
            discord_rate_limit_window_secs,
            llm,
            weekly_summary_day,
            weekly_summary_hour,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_nonzero(name: &str, default: u32) -> NonZeroU32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .and_then(NonZeroU32::new)
        .unwrap_or_else(|| NonZeroU32::new(default).unwrap_or(NonZeroU32::MIN))
}
