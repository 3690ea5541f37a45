//! Pure derived-metrics calculation over a raw match payload.
//!
//! No I/O happens here: the same payload and target identity always
//! produce the same record, which is what makes sync idempotent and the
//! stored metrics trustworthy without recomputation on read.

use crate::riot::types::{InfoDto, ParticipantDto};

/// Raised when the target player is absent from the participant list.
/// That is a malformed payload: retrying would recur identically.
#[derive(Debug, thiserror::Error)]
#[error("target player not present in match payload")]
pub struct PlayerNotInMatch;

/// Flat record of derived statistics for one participant of one match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchMetrics {
    pub champion: String,
    pub role: String,
    pub win: bool,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub kda: f64,
    pub gold_earned: i64,
    pub gold_per_min: f64,
    pub total_damage: i64,
    pub damage_per_min: f64,
    pub cs_total: i32,
    pub cs_per_min: f64,
    pub vision_score: i32,
    pub vision_per_min: f64,
    /// Share of the player's own team total, in percent.
    pub gold_share_pct: f64,
    pub damage_share_pct: f64,
    pub kill_participation_pct: f64,
    /// Per-minute deltas against the enemy laner in the same role.
    /// `None` when the role is missing or duplicated on the enemy team.
    pub lane_gold_delta_per_min: Option<f64>,
    pub lane_cs_delta_per_min: Option<f64>,
    pub game_duration_secs: i64,
    pub queue_id: i32,
    pub queue_type: String,
    pub game_start_ts: Option<i64>,
}

pub fn compute_metrics(info: &InfoDto, puuid: &str) -> Result<MatchMetrics, PlayerNotInMatch> {
    let player = info
        .participants
        .iter()
        .find(|p| p.puuid == puuid)
        .ok_or(PlayerNotInMatch)?;

    let minutes = info.game_duration as f64 / 60.0;

    let team: Vec<&ParticipantDto> = info
        .participants
        .iter()
        .filter(|p| p.team_id == player.team_id)
        .collect();

    let team_gold: i64 = team.iter().map(|p| p.gold_earned).sum();
    let team_damage: i64 = team.iter().map(|p| p.total_damage_dealt_to_champions).sum();
    let team_kills: i32 = team.iter().map(|p| p.kills).sum();

    let opponent = lane_opponent(info, player);

    let gold_per_min = per_minute(player.gold_earned as f64, minutes);
    let cs_per_min = per_minute(player.cs_total() as f64, minutes);

    Ok(MatchMetrics {
        champion: player.champion_name.clone(),
        role: player.team_position.clone(),
        win: player.win,
        kills: player.kills,
        deaths: player.deaths,
        assists: player.assists,
        kda: round2((player.kills + player.assists) as f64 / player.deaths.max(1) as f64),
        gold_earned: player.gold_earned,
        gold_per_min,
        total_damage: player.total_damage_dealt_to_champions,
        damage_per_min: per_minute(player.total_damage_dealt_to_champions as f64, minutes),
        cs_total: player.cs_total(),
        cs_per_min,
        vision_score: player.vision_score,
        vision_per_min: per_minute(player.vision_score as f64, minutes),
        gold_share_pct: share_pct(player.gold_earned, team_gold),
        damage_share_pct: share_pct(player.total_damage_dealt_to_champions, team_damage),
        kill_participation_pct: round2(
            (player.kills + player.assists) as f64 / team_kills.max(1) as f64 * 100.0,
        ),
        lane_gold_delta_per_min: opponent
            .map(|o| round2(gold_per_min - per_minute(o.gold_earned as f64, minutes))),
        lane_cs_delta_per_min: opponent
            .map(|o| round2(cs_per_min - per_minute(o.cs_total() as f64, minutes))),
        game_duration_secs: info.game_duration,
        queue_id: info.queue_id,
        queue_type: info.queue_name().to_string(),
        game_start_ts: info.game_start_timestamp,
    })
}

/// The enemy participant sharing the player's role. An absent or
/// duplicated role label disqualifies the lookup entirely so delta
/// metrics are omitted rather than guessed.
fn lane_opponent<'a>(info: &'a InfoDto, player: &ParticipantDto) -> Option<&'a ParticipantDto> {
    if player.team_position.is_empty() {
        return None;
    }

    let mut candidates = info.participants.iter().filter(|p| {
        p.team_id != player.team_id && p.team_position == player.team_position
    });

    let first = candidates.next()?;
    if candidates.next().is_some() {
        return None;
    }
    Some(first)
}

fn per_minute(total: f64, minutes: f64) -> f64 {
    if minutes <= 0.0 {
        return 0.0;
    }
    round2(total / minutes)
}

fn share_pct(value: i64, team_total: i64) -> f64 {
    if team_total <= 0 {
        return 0.0;
    }
    round2(value as f64 / team_total as f64 * 100.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
