//! Periodic tick loop driving the sync and weekly summary jobs. Job
//! errors are handled inside the jobs themselves; the loop never exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::context::AppContext;
use crate::{summary, sync};

pub struct Scheduler {
    ctx: Arc<AppContext>,
}

impl Scheduler {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        let interval_secs = self.ctx.config.sync_interval_secs;
        info!(interval_secs, "scheduler started");

        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            sync::sync_all_accounts(&self.ctx).await;
            summary::run_weekly_summaries(&self.ctx).await;
        }
    }
}
