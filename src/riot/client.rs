use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::region::Region;
use super::types::{AccountDto, MatchDto};
use crate::error::AppError;

/// Bounded retry budget for vendor-unavailable responses (timeout, 5xx).
/// 429s are handled separately by honoring the advertised delay.
const MAX_RETRIES: u32 = 2;
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Riot API client. Cheap to clone; the limiter is shared so every sync
/// worker draws from the same per-minute budget.
#[derive(Clone)]
pub struct RiotClient {
    client: reqwest::Client,
    limiter: Arc<DirectLimiter>,
    key: String,
    base_url: Option<String>,
}

impl RiotClient {
    pub fn new(key: String, per_minute: NonZeroU32) -> Self {
        let burst = per_minute.min(nonzero_ext::nonzero!(20_u32));
        let quota = Quota::per_minute(per_minute).allow_burst(burst);

        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build http client"),
            limiter: Arc::new(RateLimiter::direct(quota)),
            key,
            base_url: None,
        }
    }

    /// Route every request to a fixed host instead of the regional one.
    /// Test hook for mock servers.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    fn url(&self, region: Region, path: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{base}{path}"),
            None => format!("{}{path}", region.base_url()),
        }
    }

    pub async fn get_account_by_riot_id(
        &self,
        region: Region,
        game_name: &str,
        tag_line: &str,
    ) -> Result<AccountDto, AppError> {
        let url = self.url(
            region,
            &format!("/riot/account/v1/accounts/by-riot-id/{game_name}/{tag_line}"),
        );
        self.get(&url).await
    }

    /// Match IDs for a player, newest first, as the vendor returns them.
    pub async fn get_match_ids(
        &self,
        region: Region,
        puuid: &str,
        count: u32,
    ) -> Result<Vec<String>, AppError> {
        let url = self.url(
            region,
            &format!("/lol/match/v5/matches/by-puuid/{puuid}/ids?start=0&count={count}"),
        );
        self.get(&url).await
    }

    pub async fn get_match(&self, region: Region, match_id: &str) -> Result<MatchDto, AppError> {
        let url = self.url(region, &format!("/lol/match/v5/matches/{match_id}"));
        self.get(&url).await
    }

    /// Shared request path: rate-limit admission, auth header, status
    /// dispatch and the bounded retry loop.
    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        let mut retries = 0;
        let mut rate_limit_retries = 0;

        loop {
            self.limiter.until_ready().await;

            let result = self
                .client
                .get(url)
                .header("X-Riot-Token", &self.key)
                .send()
                .await;

            let response = match result {
                Ok(r) => r,
                Err(e) if (e.is_timeout() || e.is_connect()) && retries < MAX_RETRIES => {
                    retries += 1;
                    debug!(url, retries, "riot request failed, retrying: {e}");
                    tokio::time::sleep(RETRY_BACKOFF * 2u32.pow(retries - 1)).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match response.status() {
                StatusCode::OK => {
                    return response
                        .json()
                        .await
                        .map_err(|e| AppError::MalformedPayload(e.to_string()));
                }
                StatusCode::TOO_MANY_REQUESTS if rate_limit_retries < MAX_RATE_LIMIT_RETRIES => {
                    rate_limit_retries += 1;
                    let delay = retry_after_secs(&response).unwrap_or(1);
                    warn!(url, delay, "riot rate limited, waiting retry-after");
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }
                status if status.is_server_error() && retries < MAX_RETRIES => {
                    retries += 1;
                    debug!(url, %status, retries, "riot server error, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * 2u32.pow(retries - 1)).await;
                }
                status => {
                    let message = response.text().await.unwrap_or_default();
                    return Err(AppError::RiotApi {
                        status: status.as_u16(),
                        message,
                    });
                }
            }
        }
    }
}

fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
