//! Two-tier coaching analysis: deterministic rule tips always, an
//! LLM-backed narrative when a provider is configured, with a cached
//! fallback marked stale when the provider is unavailable.

use tokio::sync::mpsc;
use tracing::warn;

use super::llm::{LlmClient, StreamEvent};
use super::rules;
use crate::config::LlmConfig;
use crate::metrics::MatchMetrics;

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub tips: Vec<String>,
    pub llm_text: Option<String>,
    /// True when `llm_text` was served from a previous generation because
    /// the provider could not be reached this time.
    pub stale: bool,
}

#[derive(Clone)]
pub struct AnalysisGenerator {
    llm: Option<LlmClient>,
}

impl AnalysisGenerator {
    pub fn new(llm_cfg: Option<LlmConfig>) -> Self {
        Self {
            llm: llm_cfg.map(LlmClient::new),
        }
    }

    /// Generate the analysis for one metrics record. `cached` is the
    /// previously stored LLM text for the same match, if any.
    pub async fn generate(&self, metrics: &MatchMetrics, cached: Option<&str>) -> Analysis {
        let tips = rules::generate_tips(metrics);

        let Some(llm) = &self.llm else {
            return Analysis {
                tips,
                llm_text: None,
                stale: false,
            };
        };

        match llm.complete(metrics, &tips).await {
            Ok(text) => Analysis {
                tips,
                llm_text: Some(text),
                stale: false,
            },
            Err(e) => {
                warn!("LLM analysis failed, falling back: {e}");
                Analysis {
                    tips,
                    llm_text: cached.map(str::to_string),
                    stale: cached.is_some(),
                }
            }
        }
    }

    /// Streaming variant: chunks are forwarded on `tx` as they arrive.
    /// An interrupted stream retries once in non-streaming mode before
    /// falling back like `generate`.
    pub async fn generate_streaming(
        &self,
        metrics: &MatchMetrics,
        cached: Option<&str>,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Analysis {
        let tips = rules::generate_tips(metrics);

        let Some(llm) = &self.llm else {
            return Analysis {
                tips,
                llm_text: None,
                stale: false,
            };
        };

        match llm.complete_streaming(metrics, &tips, tx.clone()).await {
            Ok(text) => Analysis {
                tips,
                llm_text: Some(text),
                stale: false,
            },
            Err(stream_err) => {
                warn!("LLM stream failed ({stream_err}), retrying non-streaming");
                match llm.complete(metrics, &tips).await {
                    Ok(text) => {
                        let _ = tx.send(StreamEvent::Done(text.clone())).await;
                        Analysis {
                            tips,
                            llm_text: Some(text),
                            stale: false,
                        }
                    }
                    Err(e) => {
                        warn!("LLM analysis failed, falling back: {e}");
                        Analysis {
                            tips,
                            llm_text: cached.map(str::to_string),
                            stale: cached.is_some(),
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;

    use super::*;

    fn sample_metrics() -> MatchMetrics {
        MatchMetrics {
            champion: "Jinx".into(),
            role: "BOTTOM".into(),
            win: false,
            kills: 2,
            deaths: 7,
            assists: 4,
            kda: 0.86,
            gold_earned: 9_000,
            gold_per_min: 300.0,
            total_damage: 14_000,
            damage_per_min: 466.67,
            cs_total: 160,
            cs_per_min: 5.33,
            vision_score: 12,
            vision_per_min: 0.4,
            gold_share_pct: 18.0,
            damage_share_pct: 20.0,
            kill_participation_pct: 35.0,
            lane_gold_delta_per_min: None,
            lane_cs_delta_per_min: None,
            game_duration_secs: 1800,
            queue_id: 420,
            queue_type: "Ranked Solo/Duo".into(),
            game_start_ts: None,
        }
    }

    fn config(server: &MockServer, retries: u32) -> LlmConfig {
        LlmConfig {
            api_url: format!("{}/v1/chat/completions", server.base_url()),
            api_key: "k".into(),
            model: "deepseek-chat".into(),
            timeout_secs: 5,
            retries,
            retry_backoff_secs: 0.0,
            max_tokens: 128,
        }
    }

    #[tokio::test]
    async fn rule_tier_alone_when_llm_disabled() {
        let generator = AnalysisGenerator::new(None);
        let analysis = generator.generate(&sample_metrics(), None).await;

        assert!(!analysis.tips.is_empty());
        assert_eq!(analysis.llm_text, None);
        assert!(!analysis.stale);
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_cached_and_marks_stale() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions");
            then.status(503);
        });

        let generator = AnalysisGenerator::new(Some(config(&server, 1)));
        let analysis = generator
            .generate(&sample_metrics(), Some("previous coaching text"))
            .await;

        mock.assert_hits(2); // retries=1 configured: two attempts
        assert_eq!(analysis.llm_text.as_deref(), Some("previous coaching text"));
        assert!(analysis.stale);
        assert!(!analysis.tips.is_empty());
    }

    #[tokio::test]
    async fn llm_timeout_falls_back_to_cached_and_marks_stale() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions");
            then.status(200)
                .delay(std::time::Duration::from_secs(2))
                .json_body(serde_json::json!({
                    "choices": [{ "message": { "content": "too late" } }]
                }));
        });

        let mut cfg = config(&server, 1);
        cfg.timeout_secs = 1;
        let generator = AnalysisGenerator::new(Some(cfg));
        let analysis = generator
            .generate(&sample_metrics(), Some("previous coaching text"))
            .await;

        mock.assert_hits(2); // retries=1 configured: two attempts
        assert_eq!(analysis.llm_text.as_deref(), Some("previous coaching text"));
        assert!(analysis.stale);
    }

    #[tokio::test]
    async fn llm_failure_without_cache_keeps_rule_tier_only() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions");
            then.status(503);
        });

        let generator = AnalysisGenerator::new(Some(config(&server, 0)));
        let analysis = generator.generate(&sample_metrics(), None).await;

        assert_eq!(analysis.llm_text, None);
        assert!(!analysis.stale);
        assert!(!analysis.tips.is_empty());
    }

    #[tokio::test]
    async fn fresh_llm_text_is_not_stale() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions");
            then.status(200).json_body(serde_json::json!({
                "choices": [{ "message": { "content": "Ward more." } }]
            }));
        });

        let generator = AnalysisGenerator::new(Some(config(&server, 0)));
        let analysis = generator.generate(&sample_metrics(), Some("old")).await;

        assert_eq!(analysis.llm_text.as_deref(), Some("Ward more."));
        assert!(!analysis.stale);
    }

    #[tokio::test]
    async fn interrupted_stream_retries_non_streaming() {
        let server = MockServer::start();
        // Both modes hit the same path; the stream body is truncated, the
        // retry responds with a normal completion. httpmock matches the
        // stream flag to tell them apart.
        server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions")
                .json_body_partial(r#"{"stream": true}"#);
            then.status(200)
                .body("data: {\"choices\":[{\"delta\":{\"content\":\"half\"}}]}\n");
        });
        server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions")
                .matches(|req| {
                    req.body
                        .as_ref()
                        .is_none_or(|b| !String::from_utf8_lossy(b).contains("\"stream\":true"))
                });
            then.status(200).json_body(serde_json::json!({
                "choices": [{ "message": { "content": "Full text." } }]
            }));
        });

        let (tx, _rx) = mpsc::channel(16);
        let generator = AnalysisGenerator::new(Some(config(&server, 0)));
        let analysis = generator
            .generate_streaming(&sample_metrics(), None, tx)
            .await;

        assert_eq!(analysis.llm_text.as_deref(), Some("Full text."));
        assert!(!analysis.stale);
    }
}
