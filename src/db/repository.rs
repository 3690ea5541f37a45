use sqlx::SqlitePool;

use super::models::{Account, MatchRecord, WeeklySummary};
use crate::error::AppError;
use crate::metrics::MatchMetrics;

const MATCH_COLUMN_NAMES: [&str; 33] = [
    "id",
    "account_id",
    "match_id",
    "queue_id",
    "queue_type",
    "champion",
    "role",
    "win",
    "kills",
    "deaths",
    "assists",
    "kda",
    "gold_earned",
    "gold_per_min",
    "total_damage",
    "damage_per_min",
    "cs_total",
    "cs_per_min",
    "vision_score",
    "vision_per_min",
    "gold_share_pct",
    "damage_share_pct",
    "kill_participation_pct",
    "lane_gold_delta_per_min",
    "lane_cs_delta_per_min",
    "game_duration_secs",
    "game_start_ts",
    "recommendations",
    "llm_analysis",
    "analysis_stale",
    "analysis_generated_at",
    "notified",
    "created_at",
];

fn match_columns() -> String {
    MATCH_COLUMN_NAMES.join(", ")
}

/// A match row ready for insertion: identity plus the computed analysis.
#[derive(Debug)]
pub struct NewMatch<'a> {
    pub account_id: i64,
    pub match_id: &'a str,
    pub metrics: &'a MatchMetrics,
    pub recommendations: &'a [String],
    pub llm_analysis: Option<&'a str>,
    pub analysis_stale: bool,
}

#[derive(Clone, Debug)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // === Account operations ===

    /// Link an account, refreshing identity fields in place when the
    /// puuid is already known. Accounts are never silently deleted.
    pub async fn upsert_account(
        &self,
        puuid: &str,
        game_name: &str,
        tag_line: &str,
        platform: &str,
    ) -> Result<Account, AppError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (puuid, game_name, tag_line, platform)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(puuid) DO UPDATE SET
                game_name = excluded.game_name,
                tag_line = excluded.tag_line,
                platform = excluded.platform
            RETURNING id, puuid, game_name, tag_line, platform, discord_channel_id, notify_enabled
            "#,
        )
        .bind(puuid)
        .bind(game_name)
        .bind(tag_line)
        .bind(platform)
        .fetch_one(&self.pool)
        .await?;
        Ok(account)
    }

    pub async fn get_all_accounts(&self) -> Result<Vec<Account>, AppError> {
        let accounts = sqlx::query_as::<_, Account>(
            "SELECT id, puuid, game_name, tag_line, platform, discord_channel_id, notify_enabled
             FROM accounts ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    pub async fn set_account_channel(
        &self,
        account_id: i64,
        channel_id: Option<i64>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE accounts SET discord_channel_id = ? WHERE id = ?")
            .bind(channel_id)
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_notify_enabled(
        &self,
        account_id: i64,
        enabled: bool,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE accounts SET notify_enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Explicit unlink; match history cascades away with the account.
    pub async fn delete_account(&self, account_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // === Match operations ===

    pub async fn stored_match_ids(&self, account_id: i64) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT match_id FROM matches WHERE account_id = ?",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Insert one match with `notified = 0` and return its row id.
    /// Idempotent under the (account_id, match_id) unique index: returns
    /// `None` when the row already existed, so a re-sync never
    /// duplicates or re-notifies.
    pub async fn insert_match(&self, new: &NewMatch<'_>) -> Result<Option<i64>, AppError> {
        let m = new.metrics;
        let recommendations =
            serde_json::to_string(new.recommendations).unwrap_or_else(|_| "[]".into());
        let analysis_generated_at = new.llm_analysis.map(|_| chrono::Utc::now().timestamp());

        let row_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO matches (
                account_id, match_id, queue_id, queue_type, champion, role, win,
                kills, deaths, assists, kda,
                gold_earned, gold_per_min, total_damage, damage_per_min,
                cs_total, cs_per_min, vision_score, vision_per_min,
                gold_share_pct, damage_share_pct, kill_participation_pct,
                lane_gold_delta_per_min, lane_cs_delta_per_min,
                game_duration_secs, game_start_ts,
                recommendations, llm_analysis, analysis_stale, analysis_generated_at,
                notified
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(account_id, match_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(new.account_id)
        .bind(new.match_id)
        .bind(m.queue_id)
        .bind(&m.queue_type)
        .bind(&m.champion)
        .bind(&m.role)
        .bind(m.win)
        .bind(m.kills)
        .bind(m.deaths)
        .bind(m.assists)
        .bind(m.kda)
        .bind(m.gold_earned)
        .bind(m.gold_per_min)
        .bind(m.total_damage)
        .bind(m.damage_per_min)
        .bind(m.cs_total)
        .bind(m.cs_per_min)
        .bind(m.vision_score)
        .bind(m.vision_per_min)
        .bind(m.gold_share_pct)
        .bind(m.damage_share_pct)
        .bind(m.kill_participation_pct)
        .bind(m.lane_gold_delta_per_min)
        .bind(m.lane_cs_delta_per_min)
        .bind(m.game_duration_secs)
        .bind(m.game_start_ts)
        .bind(recommendations)
        .bind(new.llm_analysis)
        .bind(new.analysis_stale)
        .bind(analysis_generated_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row_id)
    }

    pub async fn get_match(
        &self,
        account_id: i64,
        match_id: &str,
    ) -> Result<Option<MatchRecord>, AppError> {
        let columns = match_columns();
        let record = sqlx::query_as::<_, MatchRecord>(&format!(
            "SELECT {columns} FROM matches WHERE account_id = ? AND match_id = ?"
        ))
        .bind(account_id)
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Matches persisted but not yet announced, oldest first so the
    /// notification order stays chronological on retry.
    pub async fn unnotified_matches(&self, account_id: i64) -> Result<Vec<MatchRecord>, AppError> {
        let columns = match_columns();
        let records = sqlx::query_as::<_, MatchRecord>(&format!(
            "SELECT {columns} FROM matches
             WHERE account_id = ? AND notified = 0
             ORDER BY COALESCE(game_start_ts, created_at) ASC, id ASC"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn mark_notified(&self, match_row_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE matches SET notified = 1 WHERE id = ?")
            .bind(match_row_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Rewrite the attached analysis text; everything else on the row
    /// stays immutable.
    pub async fn update_analysis(
        &self,
        match_row_id: i64,
        llm_analysis: Option<&str>,
        stale: bool,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE matches SET llm_analysis = ?, analysis_stale = ?,
             analysis_generated_at = unixepoch() WHERE id = ?",
        )
        .bind(llm_analysis)
        .bind(stale)
        .bind(match_row_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // === Dashboard reads ===

    /// Paginated match listing, newest first, optionally filtered by
    /// queue type. Reads persisted metrics only.
    pub async fn list_matches(
        &self,
        account_id: i64,
        queue_type: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MatchRecord>, AppError> {
        let columns = match_columns();
        let filter = if queue_type.is_some() {
            "AND queue_type = ?"
        } else {
            ""
        };
        let query = format!(
            "SELECT {columns} FROM matches
             WHERE account_id = ? {filter}
             ORDER BY COALESCE(game_start_ts, created_at) DESC, id DESC
             LIMIT ? OFFSET ?"
        );

        let mut q = sqlx::query_as::<_, MatchRecord>(&query).bind(account_id);
        if let Some(queue) = queue_type {
            q = q.bind(queue);
        }
        let records = q.bind(limit).bind(offset).fetch_all(&self.pool).await?;
        Ok(records)
    }

    pub async fn count_matches(
        &self,
        account_id: i64,
        queue_type: Option<&str>,
    ) -> Result<i64, AppError> {
        let filter = if queue_type.is_some() {
            "AND queue_type = ?"
        } else {
            ""
        };
        let query =
            format!("SELECT COUNT(*) FROM matches WHERE account_id = ? {filter}");

        let mut q = sqlx::query_scalar::<_, i64>(&query).bind(account_id);
        if let Some(queue) = queue_type {
            q = q.bind(queue);
        }
        Ok(q.fetch_one(&self.pool).await?)
    }

    // === Weekly summaries ===

    pub async fn matches_since(
        &self,
        account_id: i64,
        since_ts: i64,
    ) -> Result<Vec<MatchRecord>, AppError> {
        let columns = match_columns();
        let records = sqlx::query_as::<_, MatchRecord>(&format!(
            "SELECT {columns} FROM matches
             WHERE account_id = ? AND created_at >= ?
             ORDER BY created_at ASC"
        ))
        .bind(account_id)
        .bind(since_ts)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// False when a summary for this account/week already exists, which
    /// is how "at most one digest per week" is enforced.
    pub async fn insert_weekly_summary(
        &self,
        summary: &WeeklySummary,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO weekly_summaries (
                account_id, week_start, week_end, total_games, wins,
                avg_kda, avg_gold_per_min, avg_damage_per_min, summary_text, sent_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id, week_start) DO NOTHING
            "#,
        )
        .bind(summary.account_id)
        .bind(summary.week_start)
        .bind(summary.week_end)
        .bind(summary.total_games)
        .bind(summary.wins)
        .bind(summary.avg_kda)
        .bind(summary.avg_gold_per_min)
        .bind(summary.avg_damage_per_min)
        .bind(&summary.summary_text)
        .bind(summary.sent_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn test_repo() -> Repository {
        let pool = db::connect_in_memory().await.unwrap();
        Repository::new(pool)
    }

    fn metrics() -> MatchMetrics {
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
            lane_gold_delta_per_min: Some(216.66),
            lane_cs_delta_per_min: Some(2.67),
            game_duration_secs: 1800,
            queue_id: 420,
            queue_type: "Ranked Solo/Duo".into(),
            game_start_ts: Some(1_700_000_000_000),
        }
    }

    fn new_match<'a>(account_id: i64, match_id: &'a str, m: &'a MatchMetrics) -> NewMatch<'a> {
        NewMatch {
            account_id,
            match_id,
            metrics: m,
            recommendations: &[],
            llm_analysis: None,
            analysis_stale: false,
        }
    }

    #[tokio::test]
    async fn upsert_account_refreshes_identity_in_place() {
        let repo = test_repo().await;

        let a = repo.upsert_account("puuid-1", "Old", "EUW", "euw1").await.unwrap();
        let b = repo.upsert_account("puuid-1", "New", "EUW", "euw1").await.unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(b.game_name, "New");
        assert_eq!(repo.get_all_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn insert_match_is_idempotent() {
        let repo = test_repo().await;
        let account = repo.upsert_account("p", "A", "T", "euw1").await.unwrap();
        let m = metrics();

        let first = repo.insert_match(&new_match(account.id, "EUW1_1", &m)).await.unwrap();
        assert!(first.is_some());
        let second = repo.insert_match(&new_match(account.id, "EUW1_1", &m)).await.unwrap();
        assert_eq!(second, None);

        let stored = repo.get_match(account.id, "EUW1_1").await.unwrap().unwrap();
        assert_eq!(first, Some(stored.id));
        assert_eq!(repo.count_matches(account.id, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn new_match_starts_unnotified_and_flag_flips_once() {
        let repo = test_repo().await;
        let account = repo.upsert_account("p", "A", "T", "euw1").await.unwrap();
        let m = metrics();
        repo.insert_match(&new_match(account.id, "EUW1_1", &m)).await.unwrap();

        let pending = repo.unnotified_matches(account.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(!pending[0].notified);

        repo.mark_notified(pending[0].id).await.unwrap();
        assert!(repo.unnotified_matches(account.id).await.unwrap().is_empty());

        let stored = repo.get_match(account.id, "EUW1_1").await.unwrap().unwrap();
        assert!(stored.notified);
    }

    #[tokio::test]
    async fn round_trips_metrics_and_tips() {
        let repo = test_repo().await;
        let account = repo.upsert_account("p", "A", "T", "euw1").await.unwrap();
        let m = metrics();
        let tips = vec!["Ward more.".to_string()];
        repo.insert_match(&NewMatch {
            account_id: account.id,
            match_id: "EUW1_1",
            metrics: &m,
            recommendations: &tips,
            llm_analysis: Some("coach text"),
            analysis_stale: false,
        })
        .await
        .unwrap();

        let stored = repo.get_match(account.id, "EUW1_1").await.unwrap().unwrap();
        assert_eq!(stored.kda, 6.67);
        assert_eq!(stored.gold_per_min, 483.33);
        assert_eq!(stored.lane_gold_delta_per_min, Some(216.66));
        assert_eq!(stored.tips(), tips);
        assert_eq!(stored.llm_analysis.as_deref(), Some("coach text"));
        assert!(stored.analysis_generated_at.is_some());
    }

    #[tokio::test]
    async fn analysis_can_be_rewritten_later() {
        let repo = test_repo().await;
        let account = repo.upsert_account("p", "A", "T", "euw1").await.unwrap();
        let m = metrics();
        repo.insert_match(&new_match(account.id, "EUW1_1", &m)).await.unwrap();

        let stored = repo.get_match(account.id, "EUW1_1").await.unwrap().unwrap();
        repo.update_analysis(stored.id, Some("fresh take"), true).await.unwrap();

        let updated = repo.get_match(account.id, "EUW1_1").await.unwrap().unwrap();
        assert_eq!(updated.llm_analysis.as_deref(), Some("fresh take"));
        assert!(updated.analysis_stale);
        assert!(updated.analysis_generated_at.is_some());
    }

    #[tokio::test]
    async fn list_matches_paginates_and_filters_by_queue() {
        let repo = test_repo().await;
        let account = repo.upsert_account("p", "A", "T", "euw1").await.unwrap();

        let mut ranked = metrics();
        let mut aram = metrics();
        aram.queue_type = "ARAM".into();
        aram.queue_id = 450;

        for i in 0..3 {
            ranked.game_start_ts = Some(1_000 + i);
            repo.insert_match(&new_match(account.id, &format!("R_{i}"), &ranked))
                .await
                .unwrap();
        }
        aram.game_start_ts = Some(2_000);
        repo.insert_match(&new_match(account.id, "A_0", &aram)).await.unwrap();

        let all = repo.list_matches(account.id, None, 10, 0).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].match_id, "A_0"); // newest first

        let ranked_only = repo
            .list_matches(account.id, Some("Ranked Solo/Duo"), 2, 1)
            .await
            .unwrap();
        assert_eq!(ranked_only.len(), 2);
        assert!(ranked_only.iter().all(|m| m.queue_type == "Ranked Solo/Duo"));

        assert_eq!(repo.count_matches(account.id, Some("ARAM")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn weekly_summary_unique_per_week() {
        let repo = test_repo().await;
        let account = repo.upsert_account("p", "A", "T", "euw1").await.unwrap();

        let summary = WeeklySummary {
            id: 0,
            account_id: account.id,
            week_start: 19_000,
            week_end: 19_007,
            total_games: 5,
            wins: 3,
            avg_kda: 3.2,
            avg_gold_per_min: 410.0,
            avg_damage_per_min: 600.0,
            summary_text: "weekly digest".into(),
            sent_at: Some(1_700_000_000),
        };

        assert!(repo.insert_weekly_summary(&summary).await.unwrap());
        assert!(!repo.insert_weekly_summary(&summary).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_account_cascades_matches() {
        let repo = test_repo().await;
        let account = repo.upsert_account("p", "A", "T", "euw1").await.unwrap();
        let m = metrics();
        repo.insert_match(&new_match(account.id, "EUW1_1", &m)).await.unwrap();

        assert!(repo.delete_account(account.id).await.unwrap());
        assert_eq!(repo.count_matches(account.id, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn notify_opt_out_hides_the_channel() {
        let repo = test_repo().await;
        let account = repo.upsert_account("p", "A", "T", "euw1").await.unwrap();
        repo.set_account_channel(account.id, Some(42)).await.unwrap();
        repo.set_notify_enabled(account.id, false).await.unwrap();

        let account = repo.get_all_accounts().await.unwrap().remove(0);
        assert_eq!(account.discord_channel_id, Some(42));
        assert_eq!(account.notify_channel(), None);

        repo.set_notify_enabled(account.id, true).await.unwrap();
        let account = repo.get_all_accounts().await.unwrap().remove(0);
        assert_eq!(account.notify_channel(), Some(42));
    }
}
