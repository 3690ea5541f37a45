//! Weekly digest: aggregate the last seven days of stored matches into
//! one message per account, at most once per calendar week.

use std::sync::Arc;

use chrono::{Datelike, Local, NaiveTime, Timelike, Weekday};
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::db::models::{Account, MatchRecord, WeeklySummary};

const WEEK_SECS: i64 = 7 * 24 * 60 * 60;

const LOW_WIN_RATE: f64 = 50.0;
const LOW_AVG_KDA: f64 = 3.0;
const LOW_AVG_GOLD_PER_MIN: f64 = 300.0;

/// Runs on every scheduler tick but only acts on the configured weekday
/// and hour. The `(account, week_start)` unique constraint makes repeat
/// ticks within that hour no-ops.
pub async fn run_weekly_summaries(ctx: &Arc<AppContext>) {
    let now = Local::now();
    if now.weekday() != ctx.config.weekly_summary_day
        || now.hour() != ctx.config.weekly_summary_hour
    {
        return;
    }

    let accounts = match ctx.repo.get_all_accounts().await {
        Ok(accounts) => accounts,
        Err(e) => {
            warn!("failed to load accounts for weekly summary: {e}");
            return;
        }
    };

    let week_start = current_week_start(now.date_naive());
    for account in accounts {
        if let Err(e) = summarize_account(ctx, &account, week_start).await {
            warn!(account = %account.riot_id(), "weekly summary failed: {e}");
        }
    }
}

async fn summarize_account(
    ctx: &AppContext,
    account: &Account,
    week_start: i64,
) -> Result<(), crate::error::AppError> {
    let since = chrono::Utc::now().timestamp() - WEEK_SECS;
    let records = ctx.repo.matches_since(account.id, since).await?;

    let Some(summary) = aggregate_week(account.id, week_start, &records) else {
        debug!(account = %account.riot_id(), "no matches this week, skipping digest");
        return Ok(());
    };

    // False means this week's digest already went out.
    if !ctx.repo.insert_weekly_summary(&summary).await? {
        return Ok(());
    }

    if let Some(channel_id) = account.notify_channel() {
        ctx.notifier.send(channel_id, &summary.summary_text).await?;
        info!(account = %account.riot_id(), "weekly digest sent");
    }

    Ok(())
}

/// Canonical key for "this week": Monday of the current ISO week at
/// midnight, as a unix timestamp.
fn current_week_start(today: chrono::NaiveDate) -> i64 {
    today
        .week(Weekday::Mon)
        .first_day()
        .and_time(NaiveTime::MIN)
        .and_utc()
        .timestamp()
}

/// Pure aggregation over one week of match rows. `None` when the window
/// is empty.
pub fn aggregate_week(
    account_id: i64,
    week_start: i64,
    records: &[MatchRecord],
) -> Option<WeeklySummary> {
    if records.is_empty() {
        return None;
    }

    let total_games = records.len() as i64;
    let wins = records.iter().filter(|r| r.win).count() as i64;
    let n = total_games as f64;

    let avg_kda = round2(records.iter().map(|r| r.kda).sum::<f64>() / n);
    let avg_gold_per_min = round2(records.iter().map(|r| r.gold_per_min).sum::<f64>() / n);
    let avg_damage_per_min = round2(records.iter().map(|r| r.damage_per_min).sum::<f64>() / n);
    let win_rate = (wins as f64 / n * 1000.0).round() / 10.0;

    let mut focus_areas = Vec::new();
    if win_rate < LOW_WIN_RATE {
        focus_areas.push("Focus on consistency and decision-making");
    }
    if avg_kda < LOW_AVG_KDA {
        focus_areas.push("Work on survival and engagement timing");
    }
    if avg_gold_per_min < LOW_AVG_GOLD_PER_MIN {
        focus_areas.push("Improve farming efficiency and objective taking");
    }

    let mut summary_text = format!(
        "**Weekly Summary (Last 7 Days)**\n\
         **Total Games**: {total_games}\n\
         **Win Rate**: {win_rate}% ({wins}W/{}L)\n\
         **Avg KDA**: {avg_kda}\n\
         **Avg Gold/min**: {avg_gold_per_min}\n\
         **Avg Damage/min**: {avg_damage_per_min}\n",
        total_games - wins,
    );
    if !focus_areas.is_empty() {
        summary_text.push_str("\n**Improvement Focus**:\n");
        for area in &focus_areas {
            summary_text.push_str(&format!("- {area}\n"));
        }
    }

    Some(WeeklySummary {
        id: 0,
        account_id,
        week_start,
        week_end: week_start + WEEK_SECS,
        total_games,
        wins,
        avg_kda,
        avg_gold_per_min,
        avg_damage_per_min,
        summary_text,
        sent_at: Some(chrono::Utc::now().timestamp()),
    })
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
