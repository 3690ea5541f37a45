//! Shared application state handed to the scheduler jobs.

use std::collections::HashSet;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::{Mutex, Semaphore};

use crate::coach::AnalysisGenerator;
use crate::config::Config;
use crate::db::repository::Repository;
use crate::discord::DiscordNotifier;
use crate::riot::RiotClient;

pub struct AppContext {
    pub config: Config,
    pub repo: Repository,
    pub riot: RiotClient,
    pub notifier: DiscordNotifier,
    pub generator: AnalysisGenerator,
    /// Accounts with a sync currently running. A later tick skips these
    /// instead of starting a second concurrent sync for the same account.
    pub in_flight: Mutex<HashSet<i64>>,
    /// Caps concurrent account syncs at `SYNC_WORKERS`.
    pub sync_permits: Arc<Semaphore>,
}

impl AppContext {
    pub fn new(config: Config, pool: SqlitePool) -> Self {
        let riot = RiotClient::new(
            config.riot_api_key.clone(),
            config.riot_rate_limit_per_minute,
        );
        let notifier = DiscordNotifier::new(
            config.discord_bot_token.clone(),
            config.discord_rate_limit_count,
            config.discord_rate_limit_window_secs,
        );
        let generator = AnalysisGenerator::new(config.llm.clone());
        let sync_permits = Arc::new(Semaphore::new(config.sync_workers));

        Self {
            config,
            repo: Repository::new(pool),
            riot,
            notifier,
            generator,
            in_flight: Mutex::new(HashSet::new()),
            sync_permits,
        }
    }
}
