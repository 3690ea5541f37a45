//! Deterministic rule-based coaching tips derived from threshold
//! comparisons on a metrics record.

use crate::metrics::MatchMetrics;

const LOW_KDA: f64 = 2.0;
const HIGH_KDA: f64 = 5.0;
const LOW_VISION_SCORE: i32 = 15;
const HIGH_SHARE_PCT: f64 = 25.0;
const LOW_SHARE_PCT: f64 = 15.0;
const LOW_CS_PER_MIN: f64 = 5.0;
const LOW_KILL_PARTICIPATION_PCT: f64 = 40.0;

pub fn generate_tips(metrics: &MatchMetrics) -> Vec<String> {
    let mut tips = Vec::new();

    if metrics.kda < LOW_KDA {
        tips.push(
            "Focus on survival - your death rate is high. Consider backing off in dangerous situations."
                .to_string(),
        );
    } else if metrics.kda > HIGH_KDA {
        tips.push(
            "Great KDA! Consider taking more calculated risks to snowball games.".to_string(),
        );
    }

    if metrics.vision_score < LOW_VISION_SCORE {
        tips.push(
            "Vision score is low. Buy control wards and place them strategically.".to_string(),
        );
    }

    if metrics.gold_share_pct > HIGH_SHARE_PCT {
        tips.push(
            "You're getting a high gold share - make sure to capitalize on your lead.".to_string(),
        );
    } else if metrics.gold_share_pct > 0.0 && metrics.gold_share_pct < LOW_SHARE_PCT {
        tips.push(
            "Consider focusing more on farming or looking for opportunities to help your team."
                .to_string(),
        );
    }

    if metrics.damage_share_pct > HIGH_SHARE_PCT {
        tips.push("High damage output - great job carrying!".to_string());
    } else if metrics.damage_share_pct > 0.0 && metrics.damage_share_pct < LOW_SHARE_PCT {
        tips.push("Look for ways to increase your damage contribution.".to_string());
    }

    if metrics.cs_per_min > 0.0 && metrics.cs_per_min < LOW_CS_PER_MIN {
        if let Some(delta) = metrics.lane_cs_delta_per_min {
            if delta < 0.0 {
                tips.push(format!(
                    "CS/min is {:.1} below your lane opponent. Tighten up last-hitting in lane.",
                    -delta
                ));
            } else {
                tips.push("CS/min is low. Look for safe farming windows between fights.".to_string());
            }
        } else {
            tips.push("CS/min is low. Look for safe farming windows between fights.".to_string());
        }
    }

    if metrics.kill_participation_pct > 0.0
        && metrics.kill_participation_pct < LOW_KILL_PARTICIPATION_PCT
    {
        tips.push(
            "Low kill participation. Watch the map and join your team for objectives.".to_string(),
        );
    }

    if tips.is_empty() {
        tips.push("Overall solid performance. Keep practicing!".to_string());
    }

    tips
}

#[cfg(test)]
mod tests {
    use super::*;

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
            gold_share_pct: 20.0,
            damage_share_pct: 22.0,
            kill_participation_pct: 60.0,
            lane_gold_delta_per_min: Some(100.0),
            lane_cs_delta_per_min: Some(1.5),
            game_duration_secs: 1800,
            queue_id: 420,
            queue_type: "Ranked Solo/Duo".into(),
            game_start_ts: None,
        }
    }

    #[test]
    fn high_kda_praises() {
        let tips = generate_tips(&metrics());
        assert!(tips.iter().any(|t| t.contains("Great KDA")));
    }

    #[test]
    fn low_kda_and_vision_trigger_warnings() {
        let mut m = metrics();
        m.kda = 1.5;
        m.vision_score = 10;
        let tips = generate_tips(&m);
        assert!(tips.iter().any(|t| t.contains("death rate is high")));
        assert!(tips.iter().any(|t| t.contains("Vision score is low")));
    }

    #[test]
    fn lane_deficit_is_quantified() {
        let mut m = metrics();
        m.kda = 3.0;
        m.cs_per_min = 4.0;
        m.lane_cs_delta_per_min = Some(-2.3);
        let tips = generate_tips(&m);
        assert!(tips.iter().any(|t| t.contains("2.3 below your lane opponent")));
    }

    #[test]
    fn unremarkable_game_still_gets_a_tip() {
        let mut m = metrics();
        m.kda = 3.0;
        m.gold_share_pct = 20.0;
        m.damage_share_pct = 20.0;
        let tips = generate_tips(&m);
        assert_eq!(tips, vec!["Overall solid performance. Keep practicing!"]);
    }

    #[test]
    fn same_metrics_same_tips() {
        assert_eq!(generate_tips(&metrics()), generate_tips(&metrics()));
    }
}
