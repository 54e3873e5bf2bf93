use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// One played match as handed to the fitter. Records are never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub home: String,
    pub away: String,
    pub home_goals: u32,
    pub away_goals: u32,
    #[serde(default)]
    pub played_at: Option<DateTime<Utc>>,
    // (home xG, away xG) when the provider supplied it.
    #[serde(default)]
    pub xg: Option<(f64, f64)>,
}

impl MatchRecord {
    pub fn new(
        home: impl Into<String>,
        away: impl Into<String>,
        home_goals: u32,
        away_goals: u32,
    ) -> Self {
        Self {
            home: home.into(),
            away: away.into(),
            home_goals,
            away_goals,
            played_at: None,
            xg: None,
        }
    }

    pub fn played_at(mut self, when: DateTime<Utc>) -> Self {
        self.played_at = Some(when);
        self
    }

    pub fn with_xg(mut self, home_xg: f64, away_xg: f64) -> Self {
        self.xg = Some((home_xg, away_xg));
        self
    }

    /// Regression targets for the xG fit; integer goals stand in when xG is missing.
    pub fn xg_targets(&self) -> (f64, f64) {
        self.xg
            .unwrap_or((self.home_goals as f64, self.away_goals as f64))
    }
}

/// Ordered team alphabet. Coordinates of every parameter vector follow this order.
#[derive(Debug, Clone, Default)]
pub struct TeamIndex {
    teams: Vec<String>,
    by_name: HashMap<String, usize>,
}

impl TeamIndex {
    pub fn from_history(history: &[MatchRecord]) -> Self {
        let names: BTreeSet<&str> = history
            .iter()
            .flat_map(|m| [m.home.as_str(), m.away.as_str()])
            .collect();
        Self::from_sorted(names.into_iter().map(str::to_string).collect())
    }

    pub fn from_teams<S: AsRef<str>>(teams: &[S]) -> Self {
        let names: BTreeSet<&str> = teams.iter().map(|t| t.as_ref()).collect();
        Self::from_sorted(names.into_iter().map(str::to_string).collect())
    }

    fn from_sorted(teams: Vec<String>) -> Self {
        let by_name = teams
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        Self { teams, by_name }
    }

    pub fn get(&self, team: &str) -> Option<usize> {
        self.by_name.get(team).copied()
    }

    pub fn resolve(&self, team: &str) -> Result<usize> {
        self.get(team).ok_or_else(|| ModelError::UnknownTeam {
            team: team.to_string(),
        })
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

/// Checks every record against the alphabet and returns the (home, away) coordinates.
pub fn resolve_pairs(history: &[MatchRecord], index: &TeamIndex) -> Result<Vec<(usize, usize)>> {
    let mut out = Vec::with_capacity(history.len());
    for (i, m) in history.iter().enumerate() {
        if m.home == m.away {
            return Err(ModelError::InvalidRecord {
                index: i,
                reason: format!("{} cannot play itself", m.home),
            });
        }
        if let Some((hx, ax)) = m.xg
            && !(hx.is_finite() && ax.is_finite() && hx >= 0.0 && ax >= 0.0)
        {
            return Err(ModelError::InvalidRecord {
                index: i,
                reason: format!("xG must be finite and non-negative, got ({hx}, {ax})"),
            });
        }
        out.push((index.resolve(&m.home)?, index.resolve(&m.away)?));
    }
    Ok(out)
}

/// Exponential time-decay weights `exp(-xi * age_days)`, age measured against the most recent
/// timestamped record. Untimed records, or a history without any timestamps, weigh 1.
pub fn time_weights(history: &[MatchRecord], xi: f64) -> Vec<f64> {
    let Some(latest) = history.iter().filter_map(|m| m.played_at).max() else {
        return vec![1.0; history.len()];
    };
    history
        .iter()
        .map(|m| match m.played_at {
            Some(ts) => {
                let age_days = (latest - ts).num_days().max(0) as f64;
                (-xi * age_days).exp()
            }
            None => 1.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn alphabet_is_sorted_union_of_pairs() {
        let history = vec![
            MatchRecord::new("Torino", "Inter", 1, 1),
            MatchRecord::new("Atalanta", "Torino", 2, 0),
        ];
        let index = TeamIndex::from_history(&history);
        assert_eq!(index.teams(), &["Atalanta", "Inter", "Torino"]);
        assert_eq!(index.get("Torino"), Some(2));
        assert!(index.get("Genoa").is_none());
    }

    #[test]
    fn decay_weights_follow_age_in_days() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 15, 0, 0).unwrap();
        let history = vec![
            MatchRecord::new("A", "B", 1, 0).played_at(t0),
            MatchRecord::new("B", "A", 0, 0).played_at(t0 + Duration::days(10)),
            MatchRecord::new("A", "B", 2, 2),
        ];
        let w = time_weights(&history, 0.1);
        assert!((w[0] - (-1.0_f64).exp()).abs() < 1e-12);
        assert_eq!(w[1], 1.0);
        assert_eq!(w[2], 1.0);
    }

    #[test]
    fn zero_decay_gives_unit_weights() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 15, 0, 0).unwrap();
        let history: Vec<MatchRecord> = (0..5)
            .map(|i| MatchRecord::new("A", "B", 1, 0).played_at(t0 + Duration::days(i * 30)))
            .collect();
        assert!(time_weights(&history, 0.0).iter().all(|w| *w == 1.0));
    }

    #[test]
    fn negative_xg_is_rejected() {
        let history = vec![MatchRecord::new("A", "B", 1, 0).with_xg(-0.2, 1.0)];
        let index = TeamIndex::from_history(&history);
        let err = resolve_pairs(&history, &index).unwrap_err();
        assert!(matches!(err, ModelError::InvalidRecord { index: 0, .. }));
    }

    #[test]
    fn missing_xg_falls_back_to_goals() {
        let m = MatchRecord::new("A", "B", 3, 1);
        assert_eq!(m.xg_targets(), (3.0, 1.0));
        assert_eq!(m.clone().with_xg(1.4, 0.7).xg_targets(), (1.4, 0.7));
    }
}
