use serde::{Deserialize, Serialize};

use crate::forecast::FormFactors;
use crate::history::MatchRecord;

/// Points per game that maps to a neutral multiplier.
const NEUTRAL_POINTS: f64 = 1.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Most recent matches considered.
    pub window: usize,
    /// Weight of the i-th most recent match is `exp(-decay * i)`.
    pub decay: f64,
    pub sensitivity: f64,
    pub min_multiplier: f64,
    pub max_multiplier: f64,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            window: 5,
            decay: 0.2,
            sensitivity: 0.1,
            min_multiplier: 0.85,
            max_multiplier: 1.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamResult {
    Win,
    Draw,
    Loss,
}

impl TeamResult {
    pub fn points(self) -> f64 {
        match self {
            TeamResult::Win => 3.0,
            TeamResult::Draw => 1.0,
            TeamResult::Loss => 0.0,
        }
    }
}

/// Results of `team`, most recent first. Timestamped records are ordered by kick-off and come
/// before every untimed record, which counts as older than any dated one. Among records with the
/// same (or no) timestamp, later entries in `history` are treated as more recent.
pub fn recent_results(history: &[MatchRecord], team: &str) -> Vec<TeamResult> {
    let mut played: Vec<(usize, &MatchRecord)> = history
        .iter()
        .enumerate()
        .filter(|(_, m)| m.home == team || m.away == team)
        .collect();
    played.sort_by(|(ia, a), (ib, b)| b.played_at.cmp(&a.played_at).then(ib.cmp(ia)));
    played
        .into_iter()
        .map(|(_, m)| {
            let (scored, conceded) = if m.home == team {
                (m.home_goals, m.away_goals)
            } else {
                (m.away_goals, m.home_goals)
            };
            if scored > conceded {
                TeamResult::Win
            } else if scored < conceded {
                TeamResult::Loss
            } else {
                TeamResult::Draw
            }
        })
        .collect()
}

/// Decay-weighted mean points over the last `window` results. `None` for an empty run.
pub fn form_points(results: &[TeamResult], cfg: &FormConfig) -> Option<f64> {
    if results.is_empty() || cfg.window == 0 {
        return None;
    }
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    for (i, r) in results.iter().take(cfg.window).enumerate() {
        let w = (-cfg.decay * i as f64).exp();
        weighted += w * r.points();
        weight_sum += w;
    }
    Some(weighted / weight_sum)
}

pub fn form_multiplier(points: Option<f64>, cfg: &FormConfig) -> f64 {
    let Some(points) = points else {
        return 1.0;
    };
    (1.0 + cfg.sensitivity * (points - NEUTRAL_POINTS) / NEUTRAL_POINTS)
        .clamp(cfg.min_multiplier, cfg.max_multiplier)
}

/// Form multipliers for a fixture from each side's recent results in `history`.
pub fn fixture_form(history: &[MatchRecord], home: &str, away: &str, cfg: &FormConfig) -> FormFactors {
    let side = |team: &str| form_multiplier(form_points(&recent_results(history, team), cfg), cfg);
    FormFactors {
        home: side(home),
        away: side(away),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    #[test]
    fn empty_run_is_neutral() {
        let cfg = FormConfig::default();
        assert_eq!(form_points(&[], &cfg), None);
        assert_eq!(form_multiplier(None, &cfg), 1.0);
        assert_eq!(form_multiplier(Some(1.5), &cfg), 1.0);
    }

    #[test]
    fn perfect_run_maps_above_neutral() {
        let cfg = FormConfig::default();
        let points = form_points(&[TeamResult::Win; 7], &cfg).unwrap();
        assert!((points - 3.0).abs() < 1e-12);
        // 1 + 0.1 * 1.5 / 1.5 = 1.1, inside the bounds.
        assert!((form_multiplier(Some(points), &cfg) - 1.1).abs() < 1e-12);

        let sharp = FormConfig {
            sensitivity: 0.5,
            ..cfg
        };
        assert_eq!(form_multiplier(Some(points), &sharp), sharp.max_multiplier);
    }

    #[test]
    fn recent_matches_weigh_more() {
        let cfg = FormConfig::default();
        let win_then_losses = [TeamResult::Win, TeamResult::Loss, TeamResult::Loss];
        let loss_then_wins = [TeamResult::Loss, TeamResult::Win, TeamResult::Loss];
        assert!(form_points(&win_then_losses, &cfg) > form_points(&loss_then_wins, &cfg));
    }

    #[test]
    fn results_are_ordered_by_kickoff() {
        let t0 = Utc.with_ymd_and_hms(2024, 9, 1, 18, 0, 0).unwrap();
        let history = vec![
            MatchRecord::new("Roma", "Bologna", 0, 1).played_at(t0 + Duration::days(14)),
            MatchRecord::new("Napoli", "Roma", 0, 3).played_at(t0),
            MatchRecord::new("Roma", "Torino", 1, 1).played_at(t0 + Duration::days(7)),
        ];
        assert_eq!(
            recent_results(&history, "Roma"),
            vec![TeamResult::Loss, TeamResult::Draw, TeamResult::Win]
        );
        let form = fixture_form(&history, "Roma", "Bologna", &FormConfig::default());
        assert!(form.home < 1.0);
        assert!(form.away > 1.0);
    }

    #[test]
    fn untimed_results_rank_behind_dated_ones() {
        let t0 = Utc.with_ymd_and_hms(2024, 9, 1, 18, 0, 0).unwrap();
        let history = vec![
            MatchRecord::new("Roma", "Bologna", 0, 1),
            MatchRecord::new("Napoli", "Roma", 0, 3).played_at(t0),
            MatchRecord::new("Roma", "Torino", 1, 1),
        ];
        assert_eq!(
            recent_results(&history, "Roma"),
            vec![TeamResult::Win, TeamResult::Draw, TeamResult::Loss]
        );
    }
}
