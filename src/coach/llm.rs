//! Client for an OpenAI-compatible chat-completion endpoint.
//!
//! Supports a one-shot completion and a streaming variant that yields
//! incremental text chunks. Retry policy: timeouts and 5xx responses are
//! retried with exponential backoff up to the configured budget; auth and
//! routing errors (401/404) fail fast.

use std::time::Duration;

use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::AppError;
use crate::metrics::MatchMetrics;

/// Incremental events produced by the streaming completion mode.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(String),
    Done(String),
    Error(String),
}

#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    cfg: LlmConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: ChatMessage,
}

#[derive(Deserialize, Default)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient {
    pub fn new(cfg: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(cfg.timeout_secs))
                .build()
                .expect("failed to build http client"),
            cfg,
        }
    }

    /// One-shot completion over the metrics record and rule tips.
    pub async fn complete(&self, metrics: &MatchMetrics, tips: &[String]) -> Result<String, AppError> {
        let body = self.request_body(metrics, tips, false);
        let attempts = self.cfg.retries + 1;
        let mut last_error = AppError::Llm("no attempt made".into());

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.backoff(attempt - 1)).await;
            }

            match self.send(&body).await {
                Ok(response) => match self.handle_status(response).await? {
                    Some(response) => return self.parse_completion(response).await,
                    // 5xx: worth another attempt
                    None => {
                        last_error = AppError::Llm("provider returned a server error".into());
                    }
                },
                Err(e) if e.is_timeout() || e.is_connect() => {
                    debug!(attempt, "LLM request failed, will retry: {e}");
                    last_error = e.into();
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_error)
    }

    /// Streaming completion. Chunks are forwarded on `tx` as they arrive
    /// and the assembled text is returned once the provider signals
    /// completion. An interrupted stream is an error so the caller can
    /// fall back to the non-streaming mode.
    pub async fn complete_streaming(
        &self,
        metrics: &MatchMetrics,
        tips: &[String],
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<String, AppError> {
        let body = self.request_body(metrics, tips, true);

        let response = self.send(&body).await?;
        let response = self
            .handle_status(response)
            .await?
            .ok_or_else(|| AppError::Llm("provider returned a server error".into()))?;

        let mut collected = String::new();
        let mut completed = false;
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(AppError::Http)?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);

                let Some(data) = parse_sse_line(&line) else {
                    continue;
                };
                if data == "[DONE]" {
                    completed = true;
                    break 'outer;
                }
                let Ok(payload) = serde_json::from_str::<StreamResponse>(data) else {
                    continue;
                };
                if let Some(delta) = payload
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.as_deref())
                {
                    collected.push_str(delta);
                    let _ = tx.send(StreamEvent::Chunk(delta.to_string())).await;
                }
            }
        }

        if !completed {
            let _ = tx
                .send(StreamEvent::Error("stream interrupted before completion".into()))
                .await;
            return Err(AppError::Llm("stream interrupted before completion".into()));
        }
        if collected.is_empty() {
            return Err(AppError::Llm("stream completed without content".into()));
        }

        let _ = tx.send(StreamEvent::Done(collected.clone())).await;
        Ok(collected)
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(&self.cfg.api_url)
            .bearer_auth(&self.cfg.api_key)
            .json(body)
            .send()
            .await
    }

    /// `Ok(Some)` for usable responses, `Ok(None)` for retryable 5xx,
    /// `Err` for everything that should fail fast.
    async fn handle_status(
        &self,
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, AppError> {
        match response.status() {
            StatusCode::OK => Ok(Some(response)),
            status if status.is_server_error() => {
                warn!(%status, "LLM provider unavailable");
                Ok(None)
            }
            StatusCode::UNAUTHORIZED => Err(AppError::Llm(
                "authentication failed (401), check LLM_API_KEY".into(),
            )),
            StatusCode::NOT_FOUND => Err(AppError::Llm(format!(
                "endpoint not found (404), check LLM_API_URL: {}",
                self.cfg.api_url
            ))),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(AppError::Llm(format!(
                    "provider returned status {status}: {}",
                    text.chars().take(300).collect::<String>()
                )))
            }
        }
    }

    async fn parse_completion(&self, response: reqwest::Response) -> Result<String, AppError> {
        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("non-JSON response: {e}")))?;

        let message = data
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .unwrap_or_default();

        message
            .content
            .or(message.reasoning_content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::Llm("response missing choices/content".into()))
    }

    fn request_body(&self, metrics: &MatchMetrics, tips: &[String], stream: bool) -> serde_json::Value {
        let (system, user) = build_prompt(metrics, tips);
        let mut body = serde_json::json!({
            "model": self.cfg.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "max_tokens": self.cfg.max_tokens,
            "temperature": 0.7,
        });
        if stream {
            body["stream"] = serde_json::Value::Bool(true);
        }
        body
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.cfg.retry_backoff_secs * f64::from(2u32.pow(attempt)))
    }
}

fn parse_sse_line(line: &str) -> Option<&str> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:").unwrap_or(line).trim();
    (!data.is_empty()).then_some(data)
}

fn build_prompt(metrics: &MatchMetrics, tips: &[String]) -> (String, String) {
    let result = if metrics.win { "Victory" } else { "Defeat" };
    let system = "You are a concise, expert League of Legends performance coach. \
                  Give specific, data-driven advice."
        .to_string();

    let mut user = format!(
        "Analyze this match performance and provide specific, actionable coaching advice.\n\n\
         Match Data:\n\
         - Champion: {}\n\
         - Role: {}\n\
         - Result: {result}\n\
         - KDA: {}/{}/{} (Ratio: {})\n\
         - Gold: {} total ({}/min)\n\
         - Damage: {} total ({}/min)\n\
         - Vision Score: {}\n\
         - CS: {} ({}/min)\n\
         - Gold share of team: {}%\n\
         - Damage share of team: {}%\n\
         - Kill participation: {}%\n\
         - Game Duration: {:.1} minutes\n",
        metrics.champion,
        metrics.role,
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
        metrics.gold_share_pct,
        metrics.damage_share_pct,
        metrics.kill_participation_pct,
        metrics.game_duration_secs as f64 / 60.0,
    );

    if let Some(delta) = metrics.lane_gold_delta_per_min {
        user.push_str(&format!("- Gold/min vs lane opponent: {delta:+}\n"));
    }

    if !tips.is_empty() {
        user.push_str("\nRule-based observations:\n");
        for tip in tips {
            user.push_str(&format!("- {tip}\n"));
        }
    }

    user.push_str(
        "\nProvide a concise analysis (3-5 paragraphs) covering:\n\
         1. Overall performance assessment for this champion\n\
         2. Key strengths shown in this match\n\
         3. Specific areas to improve with actionable advice\n\
         4. One concrete thing to practice in the next game\n\n\
         Keep it direct and specific to this match data. No generic advice.",
    );

    (system, user)
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;
    use tokio::sync::mpsc;

    use super::*;

    fn config(server: &MockServer, retries: u32) -> LlmConfig {
        LlmConfig {
            api_url: format!("{}/v1/chat/completions", server.base_url()),
            api_key: "test-key".into(),
            model: "deepseek-chat".into(),
            timeout_secs: 5,
            retries,
            retry_backoff_secs: 0.0,
            max_tokens: 256,
        }
    }

    fn sample_metrics() -> MatchMetrics {
        MatchMetrics {
            champion: "Ahri".into(),
            role: "MIDDLE".into(),
            win: true,
            kills: 8,
            deaths: 3,
            assists: 12,
            kda: 6.67,
            gold_earned: 14_500,
            gold_per_min: 483.33,
            total_damage: 27_000,
            damage_per_min: 900.0,
            cs_total: 210,
            cs_per_min: 7.0,
            vision_score: 30,
            vision_per_min: 1.0,
            gold_share_pct: 22.0,
            damage_share_pct: 25.0,
            kill_participation_pct: 60.0,
            lane_gold_delta_per_min: Some(120.5),
            lane_cs_delta_per_min: Some(1.2),
            game_duration_secs: 1800,
            queue_id: 420,
            queue_type: "Ranked Solo/Duo".into(),
            game_start_ts: None,
        }
    }

    #[tokio::test]
    async fn completion_extracts_message_content() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions")
                .header("Authorization", "Bearer test-key");
            then.status(200).json_body(serde_json::json!({
                "choices": [{ "message": { "content": "  Solid mid game.  " } }]
            }));
        });

        let client = LlmClient::new(config(&server, 0));
        let text = client.complete(&sample_metrics(), &[]).await.unwrap();

        mock.assert();
        assert_eq!(text, "Solid mid game.");
    }

    #[tokio::test]
    async fn server_errors_consume_retry_budget() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions");
            then.status(503);
        });

        let client = LlmClient::new(config(&server, 1));
        let err = client.complete(&sample_metrics(), &[]).await.unwrap_err();

        mock.assert_hits(2); // retries=1 means two attempts total
        assert!(matches!(err, AppError::Llm(_)));
    }

    #[tokio::test]
    async fn timeouts_consume_retry_budget() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions");
            // Responds well past the client timeout.
            then.status(200)
                .delay(Duration::from_secs(2))
                .json_body(serde_json::json!({
                    "choices": [{ "message": { "content": "too late" } }]
                }));
        });

        let mut cfg = config(&server, 1);
        cfg.timeout_secs = 1;
        let client = LlmClient::new(cfg);
        let err = client.complete(&sample_metrics(), &[]).await.unwrap_err();

        mock.assert_hits(2); // retries=1 means two attempts
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions");
            then.status(401);
        });

        let client = LlmClient::new(config(&server, 3));
        let err = client.complete(&sample_metrics(), &[]).await.unwrap_err();

        mock.assert_hits(1);
        assert!(matches!(err, AppError::Llm(_)));
    }

    #[tokio::test]
    async fn streaming_yields_chunks_then_done() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions");
            then.status(200).body(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Push \"}}]}\n\
                 data: {\"choices\":[{\"delta\":{\"content\":\"mid.\"}}]}\n\
                 data: [DONE]\n",
            );
        });

        let (tx, mut rx) = mpsc::channel(16);
        let client = LlmClient::new(config(&server, 0));
        let text = client
            .complete_streaming(&sample_metrics(), &[], tx)
            .await
            .unwrap();

        assert_eq!(text, "Push mid.");
        assert_eq!(rx.recv().await, Some(StreamEvent::Chunk("Push ".into())));
        assert_eq!(rx.recv().await, Some(StreamEvent::Chunk("mid.".into())));
        assert_eq!(rx.recv().await, Some(StreamEvent::Done("Push mid.".into())));
    }

    #[tokio::test]
    async fn interrupted_stream_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions");
            // No [DONE] terminator: the body just ends.
            then.status(200)
                .body("data: {\"choices\":[{\"delta\":{\"content\":\"Push\"}}]}\n");
        });

        let (tx, mut rx) = mpsc::channel(16);
        let client = LlmClient::new(config(&server, 0));
        let err = client
            .complete_streaming(&sample_metrics(), &[], tx)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Llm(_)));
        assert_eq!(rx.recv().await, Some(StreamEvent::Chunk("Push".into())));
        assert!(matches!(rx.recv().await, Some(StreamEvent::Error(_))));
    }

    #[test]
    fn prompt_includes_metrics_and_tips() {
        let (system, user) = build_prompt(
            &sample_metrics(),
            &["Vision score is low.".to_string()],
        );
        assert!(system.contains("coach"));
        assert!(user.contains("Ahri"));
        assert!(user.contains("8/3/12"));
        assert!(user.contains("Vision score is low."));
        assert!(user.contains("+120.5"));
    }
}
