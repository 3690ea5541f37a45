use std::sync::Arc;

use tracing::info;

use riftcoach::config::Config;
use riftcoach::context::AppContext;
use riftcoach::error::AppError;
use riftcoach::scheduler::Scheduler;
use riftcoach::{db, logging};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init();

    let config = Config::from_env()?;

    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let ctx = Arc::new(AppContext::new(config, pool));

    info!("starting match-sync service");
    let scheduler = Scheduler::new(ctx).start();

    // The scheduler loop never returns on its own; a join error means it
    // panicked and the process should go down with it.
    if let Err(e) = scheduler.await {
        tracing::error!("scheduler task aborted: {e}");
    }
    Ok(())
}
