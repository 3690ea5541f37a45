//! Match-sync job: diff the vendor's recent match list against storage,
//! analyze whatever is new, and announce it.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::coach::Analysis;
use crate::context::AppContext;
use crate::db::models::{Account, MatchRecord};
use crate::db::repository::NewMatch;
use crate::discord;
use crate::error::AppError;
use crate::metrics;
use crate::riot::Platform;

/// One sync pass over every linked account. Accounts run on a bounded
/// worker pool; a failure in one account is logged and never aborts the
/// others.
pub async fn sync_all_accounts(ctx: &Arc<AppContext>) {
    let accounts = match ctx.repo.get_all_accounts().await {
        Ok(accounts) => accounts,
        Err(e) => {
            error!("failed to load accounts for sync: {e}");
            return;
        }
    };

    debug!(count = accounts.len(), "starting sync cycle");

    let mut workers = JoinSet::new();
    for account in accounts {
        // Skip accounts whose previous sync is still running.
        if !ctx.in_flight.lock().await.insert(account.id) {
            debug!(account = %account.riot_id(), "sync still in flight, skipping");
            continue;
        }

        let ctx = Arc::clone(ctx);
        workers.spawn(async move {
            // The semaphore is never closed; `ok()` keeps the permit alive.
            let _permit = ctx.sync_permits.clone().acquire_owned().await.ok();
            let riot_id = account.riot_id();
            let account_id = account.id;

            if let Err(e) = sync_account(&ctx, &account).await {
                warn!(account = %riot_id, "sync failed: {e}");
            }

            ctx.in_flight.lock().await.remove(&account_id);
        });
    }

    while workers.join_next().await.is_some() {}
}

/// Sync one account: resend pending notifications first, then fetch,
/// analyze, store and announce any matches missing from storage.
///
/// Notifications within an account must stay in chronological order, so
/// the first failed send in a pass blocks every later send: the rows
/// still land with `notified = 0` and the next tick's resend delivers
/// them oldest-first.
async fn sync_account(ctx: &AppContext, account: &Account) -> Result<(), AppError> {
    let platform: Platform = account.platform.parse()?;
    let region = platform.to_region();

    let mut delivery_blocked = !resend_pending(ctx, account).await?;

    let fetched = ctx
        .riot
        .get_match_ids(region, &account.puuid, ctx.config.sync_match_count)
        .await?;
    let stored = ctx.repo.stored_match_ids(account.id).await?;
    let missing = missing_ids(&fetched, &stored);

    if missing.is_empty() {
        debug!(account = %account.riot_id(), "no new matches");
        return Ok(());
    }

    info!(
        account = %account.riot_id(),
        count = missing.len(),
        "processing new matches"
    );

    for match_id in &missing {
        // One bad match never blocks the rest of the backlog.
        match process_match(ctx, account, region, match_id, delivery_blocked).await {
            Ok(delivered) => delivery_blocked |= !delivered,
            Err(e) => {
                warn!(account = %account.riot_id(), match_id, "skipping match: {e}");
            }
        }
    }

    Ok(())
}

/// Fetch, analyze, persist and announce a single match. Returns whether
/// delivery is still unblocked afterwards: true unless a send failed.
async fn process_match(
    ctx: &AppContext,
    account: &Account,
    region: crate::riot::Region,
    match_id: &str,
    delivery_blocked: bool,
) -> Result<bool, AppError> {
    let match_data = ctx.riot.get_match(region, match_id).await?;

    let metrics = metrics::compute_metrics(&match_data.info, &account.puuid).map_err(|_| {
        AppError::PlayerNotInMatch {
            puuid: account.puuid.clone(),
            match_id: match_id.to_string(),
        }
    })?;

    let analysis = ctx.generator.generate(&metrics, None).await;

    let row_id = ctx
        .repo
        .insert_match(&NewMatch {
            account_id: account.id,
            match_id,
            metrics: &metrics,
            recommendations: &analysis.tips,
            llm_analysis: analysis.llm_text.as_deref(),
            analysis_stale: analysis.stale,
        })
        .await?;

    let Some(row_id) = row_id else {
        debug!(match_id, "already stored, nothing to do");
        return Ok(true);
    };

    if delivery_blocked {
        debug!(match_id, "delivery blocked by an earlier failure, stored as pending");
        return Ok(false);
    }

    Ok(notify(ctx, account, &metrics, &analysis, match_id, row_id).await)
}

/// Send the match report. A failure leaves `notified` unset so the next
/// tick resends; only a confirmed delivery flips the flag. Returns
/// false when the send failed.
async fn notify(
    ctx: &AppContext,
    account: &Account,
    metrics: &crate::metrics::MatchMetrics,
    analysis: &Analysis,
    match_id: &str,
    row_id: i64,
) -> bool {
    let Some(channel_id) = account.notify_channel() else {
        return true;
    };

    let report = discord::format_match_report(&account.riot_id(), metrics, analysis);
    match ctx.notifier.send(channel_id, &report).await {
        Ok(()) => {
            if let Err(e) = ctx.repo.mark_notified(row_id).await {
                warn!(match_id, "failed to mark notified: {e}");
            }
            true
        }
        Err(e) => {
            warn!(match_id, "notification failed, will retry next tick: {e}");
            false
        }
    }
}

/// Re-announce matches that were stored but never delivered, rebuilding
/// the report from the persisted metrics rather than refetching.
/// Returns false when a resend failed and later sends must stay blocked
/// to preserve chronological order.
async fn resend_pending(ctx: &AppContext, account: &Account) -> Result<bool, AppError> {
    let Some(channel_id) = account.notify_channel() else {
        return Ok(true);
    };

    let pending = ctx.repo.unnotified_matches(account.id).await?;
    for record in pending {
        let report = render_stored_report(account, &record);
        match ctx.notifier.send(channel_id, &report).await {
            Ok(()) => ctx.repo.mark_notified(record.id).await?,
            Err(e) => {
                warn!(match_id = %record.match_id, "resend failed: {e}");
                // Keep chronological order: stop instead of delivering
                // a later match before an earlier one.
                return Ok(false);
            }
        }
    }

    Ok(true)
}

fn render_stored_report(account: &Account, record: &MatchRecord) -> String {
    let analysis = Analysis {
        tips: record.tips(),
        llm_text: record.llm_analysis.clone(),
        stale: record.analysis_stale,
    };
    discord::format_match_report(&account.riot_id(), &record.metrics(), &analysis)
}

/// IDs in the fetched list that storage does not know yet, reordered
/// oldest-first so notifications arrive chronologically. The vendor
/// returns newest-first.
fn missing_ids(fetched: &[String], stored: &[String]) -> Vec<String> {
    fetched
        .iter()
        .rev()
        .filter(|id| !stored.contains(id))
        .cloned()
        .collect()
}
