use sqlx::FromRow;

use crate::metrics::MatchMetrics;

/// A linked Riot account with an optional Discord notification target.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: i64,
    pub puuid: String,
    pub game_name: String,
    pub tag_line: String,
    pub platform: String,
    pub discord_channel_id: Option<i64>,
    pub notify_enabled: bool,
}

impl Account {
    pub fn riot_id(&self) -> String {
        format!("{}#{}", self.game_name, self.tag_line)
    }

    /// Notification target, honoring the per-account opt-out.
    pub fn notify_channel(&self) -> Option<i64> {
        self.notify_enabled.then_some(self.discord_channel_id).flatten()
    }
}

/// One stored match with its derived metrics. Immutable after insert
/// except the analysis columns and the notified flag.
#[derive(Debug, Clone, FromRow)]
pub struct MatchRecord {
    pub id: i64,
    pub account_id: i64,
    pub match_id: String,
    pub queue_id: i64,
    pub queue_type: String,
    pub champion: String,
    pub role: String,
    pub win: bool,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub kda: f64,
    pub gold_earned: i64,
    pub gold_per_min: f64,
    pub total_damage: i64,
    pub damage_per_min: f64,
    pub cs_total: i64,
    pub cs_per_min: f64,
    pub vision_score: i64,
    pub vision_per_min: f64,
    pub gold_share_pct: f64,
    pub damage_share_pct: f64,
    pub kill_participation_pct: f64,
    pub lane_gold_delta_per_min: Option<f64>,
    pub lane_cs_delta_per_min: Option<f64>,
    pub game_duration_secs: i64,
    pub game_start_ts: Option<i64>,
    /// JSON array of rule-based tips.
    pub recommendations: String,
    pub llm_analysis: Option<String>,
    pub analysis_stale: bool,
    pub analysis_generated_at: Option<i64>,
    pub notified: bool,
    pub created_at: i64,
}

impl MatchRecord {
    pub fn tips(&self) -> Vec<String> {
        serde_json::from_str(&self.recommendations).unwrap_or_default()
    }

    /// Rebuild the metrics record from the stored columns, so a pending
    /// notification can be re-rendered without refetching the match.
    pub fn metrics(&self) -> MatchMetrics {
        MatchMetrics {
            champion: self.champion.clone(),
            role: self.role.clone(),
            win: self.win,
            kills: self.kills as i32,
            deaths: self.deaths as i32,
            assists: self.assists as i32,
            kda: self.kda,
            gold_earned: self.gold_earned,
            gold_per_min: self.gold_per_min,
            total_damage: self.total_damage,
            damage_per_min: self.damage_per_min,
            cs_total: self.cs_total as i32,
            cs_per_min: self.cs_per_min,
            vision_score: self.vision_score as i32,
            vision_per_min: self.vision_per_min,
            gold_share_pct: self.gold_share_pct,
            damage_share_pct: self.damage_share_pct,
            kill_participation_pct: self.kill_participation_pct,
            lane_gold_delta_per_min: self.lane_gold_delta_per_min,
            lane_cs_delta_per_min: self.lane_cs_delta_per_min,
            game_duration_secs: self.game_duration_secs,
            queue_id: self.queue_id as i32,
            queue_type: self.queue_type.clone(),
            game_start_ts: self.game_start_ts,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct WeeklySummary {
    pub id: i64,
    pub account_id: i64,
    pub week_start: i64,
    pub week_end: i64,
    pub total_games: i64,
    pub wins: i64,
    pub avg_kda: f64,
    pub avg_gold_per_min: f64,
    pub avg_damage_per_min: f64,
    pub summary_text: String,
    pub sent_at: Option<i64>,
}
