use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Riot API error: {status} - {message}")]
    RiotApi { status: u16, message: String },

    #[error("Discord API error: {status} - {message}")]
    DiscordApi { status: u16, message: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Player {puuid} not found in match {match_id}")]
    PlayerNotInMatch { puuid: String, match_id: String },

    #[error("Invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),
}

impl AppError {
    /// Vendor-unavailable failures (timeout, 5xx) are worth another attempt
    /// on a later tick; malformed payloads would recur identically.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::RiotApi { status, .. } | AppError::DiscordApi { status, .. } => {
                *status == 429 || *status >= 500
            }
            AppError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
