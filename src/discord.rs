//! Discord notification over the plain REST API. No gateway connection:
//! the service only ever posts messages to known channel IDs.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::coach::Analysis;
use crate::error::AppError;
use crate::metrics::MatchMetrics;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Discord enforces a 2000 character limit per message.
const MAX_MESSAGE_LEN: usize = 2000;

/// LLM text appended to a match report is trimmed to leave room for the
/// stats block.
const AI_SECTION_LEN: usize = 800;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone)]
pub struct DiscordNotifier {
    client: reqwest::Client,
    limiter: Arc<DirectLimiter>,
    token: String,
    base_url: String,
}

impl DiscordNotifier {
    pub fn new(token: String, rate_limit_count: NonZeroU32, rate_limit_window_secs: u64) -> Self {
        let window = Duration::from_secs(rate_limit_window_secs.max(1));
        let quota = Quota::with_period(window / rate_limit_count.get())
            .unwrap_or_else(|| Quota::per_second(rate_limit_count))
            .allow_burst(rate_limit_count);

        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build http client"),
            limiter: Arc::new(RateLimiter::direct(quota)),
            token,
            base_url: DISCORD_API_BASE.to_string(),
        }
    }

    /// Test hook for mock servers.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Post a message to a channel. A 429 is retried once after the
    /// advertised delay; any other failure is returned to the caller so
    /// the notified flag stays unset for a later resend.
    pub async fn send(&self, channel_id: i64, content: &str) -> Result<(), AppError> {
        let url = format!("{}/channels/{channel_id}/messages", self.base_url);
        let content = truncate(content, MAX_MESSAGE_LEN);

        let mut rate_limited_once = false;
        loop {
            self.limiter.until_ready().await;

            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bot {}", self.token))
                .json(&serde_json::json!({ "content": content }))
                .send()
                .await?;

            match response.status() {
                StatusCode::OK | StatusCode::CREATED => {
                    debug!(channel_id, "notification sent");
                    return Ok(());
                }
                StatusCode::TOO_MANY_REQUESTS if !rate_limited_once => {
                    rate_limited_once = true;
                    let delay = retry_after(&response).await;
                    warn!(channel_id, ?delay, "discord rate limited, honoring retry-after");
                    tokio::time::sleep(delay).await;
                }
                status => {
                    let message = response.text().await.unwrap_or_default();
                    return Err(AppError::DiscordApi {
                        status: status.as_u16(),
                        message,
                    });
                }
            }
        }
    }
}

async fn retry_after(response: &reqwest::Response) -> Duration {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())
        .map(Duration::from_secs_f64)
        .unwrap_or(Duration::from_secs(1))
}

fn truncate(content: &str, max_len: usize) -> String {
    if content.len() <= max_len {
        return content.to_string();
    }
    let mut cut = max_len - 3;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &content[..cut])
}

/// Discord-friendly match report: stats block, rule tips, and a trimmed
/// AI-coach section when LLM text exists.
pub fn format_match_report(game_name: &str, metrics: &MatchMetrics, analysis: &Analysis) -> String {
    let result = if metrics.win { "WIN" } else { "LOSS" };

    let mut report = format!(
        "**Match Analysis Report** - {game_name}\n\
         **Champion**: {}\n\
         **Queue**: {}\n\
         **Result**: {result}\n\
         **KDA**: {}/{}/{} ({})\n\
         **Gold**: {} ({}/min)\n\
         **Damage**: {} ({}/min)\n\
         **Vision Score**: {}\n\
         **CS**: {} ({}/min)\n\
         **Kill Participation**: {}%\n\
         **Duration**: {:.1} min\n",
        metrics.champion,
        metrics.queue_type,
        metrics.kills,
        metrics.deaths,
        metrics.assists,
        metrics.kda,
        metrics.gold_earned,
        metrics.gold_per_min,
        metrics.total_damage,
        metrics.damage_per_min,
        metrics.vision_score,
        metrics.cs_total,
        metrics.cs_per_min,
        metrics.kill_participation_pct,
        metrics.game_duration_secs as f64 / 60.0,
    );

    if let Some(delta) = metrics.lane_gold_delta_per_min {
        report.push_str(&format!("**Gold/min vs lane**: {delta:+}\n"));
    }

    report.push_str("\n**Recommendations**:\n");
    for tip in &analysis.tips {
        report.push_str(&format!("- {tip}\n"));
    }

    if let Some(text) = &analysis.llm_text {
        let marker = if analysis.stale { " (cached)" } else { "" };
        report.push_str(&format!(
            "\n**AI Coach{marker}**:\n{}",
            truncate(text, AI_SECTION_LEN)
        ));
    }

    report
}
