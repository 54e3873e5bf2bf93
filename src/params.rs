use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::fitter::FitMode;
use crate::history::TeamIndex;

pub const PARAMS_VERSION: u32 = 1;

pub const RHO_MIN: f64 = -0.5;
pub const RHO_MAX: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRating {
    pub team: String,
    pub attack: f64,
    pub defence: f64,
}

/// Fitted Dixon-Coles parameters. Never mutated after construction: edits produce a fresh set.
#[derive(Debug, Clone)]
pub struct ParameterSet {
    index: TeamIndex,
    attack: Vec<f64>,
    defence: Vec<f64>,
    home_advantage: f64,
    rho: f64,
    xi: f64,
    fitted: bool,
    converged: bool,
    mode: Option<FitMode>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ParameterArtifact {
    version: u32,
    generated_at: String,
    #[serde(default)]
    mode: Option<FitMode>,
    fitted: bool,
    converged: bool,
    home_advantage: f64,
    rho: f64,
    xi: f64,
    ratings: Vec<TeamRating>,
}

impl ParameterSet {
    /// Placeholder for a model that has not been trained yet; forecasting against it fails.
    pub fn unfitted<S: AsRef<str>>(teams: &[S], home_advantage: f64, rho: f64, xi: f64) -> Self {
        let index = TeamIndex::from_teams(teams);
        let n = index.len();
        Self {
            index,
            attack: vec![1.0; n],
            defence: vec![1.0; n],
            home_advantage,
            rho,
            xi,
            fitted: false,
            converged: false,
            mode: None,
        }
    }

    /// Builds a fitted set from explicit ratings.
    pub fn from_ratings(
        ratings: Vec<TeamRating>,
        home_advantage: f64,
        rho: f64,
        xi: f64,
    ) -> Result<Self> {
        let index = TeamIndex::from_teams(&ratings.iter().map(|r| r.team.as_str()).collect::<Vec<_>>());
        if index.len() != ratings.len() {
            return Err(ModelError::InvalidParameter {
                name: "ratings (duplicate team)".to_string(),
                value: ratings.len() as f64,
            });
        }
        let mut attack = vec![0.0; index.len()];
        let mut defence = vec![0.0; index.len()];
        for r in &ratings {
            let slot = index.resolve(&r.team)?;
            attack[slot] = r.attack;
            defence[slot] = r.defence;
        }
        let set = Self {
            index,
            attack,
            defence,
            home_advantage,
            rho,
            xi,
            fitted: true,
            converged: true,
            mode: None,
        };
        set.validate()?;
        Ok(set)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_fit(
        index: TeamIndex,
        attack: Vec<f64>,
        defence: Vec<f64>,
        home_advantage: f64,
        rho: f64,
        xi: f64,
        converged: bool,
        mode: FitMode,
    ) -> Self {
        Self {
            index,
            attack,
            defence,
            home_advantage,
            rho,
            xi,
            fitted: true,
            converged,
            mode: Some(mode),
        }
    }

    /// Copy of this set with one team's ratings replaced.
    pub fn with_rating(&self, team: &str, attack: f64, defence: f64) -> Result<Self> {
        let slot = self.index.resolve(team)?;
        let mut next = self.clone();
        next.attack[slot] = attack;
        next.defence[slot] = defence;
        next.validate()?;
        Ok(next)
    }

    fn validate(&self) -> Result<()> {
        for (i, team) in self.index.teams().iter().enumerate() {
            check_positive(&format!("attack[{team}]"), self.attack[i])?;
            check_positive(&format!("defence[{team}]"), self.defence[i])?;
        }
        check_positive("home_advantage", self.home_advantage)?;
        if !(RHO_MIN..=RHO_MAX).contains(&self.rho) {
            return Err(ModelError::InvalidParameter {
                name: "rho".to_string(),
                value: self.rho,
            });
        }
        if !(self.xi >= 0.0 && self.xi.is_finite()) {
            return Err(ModelError::InvalidParameter {
                name: "xi".to_string(),
                value: self.xi,
            });
        }
        Ok(())
    }

    pub fn teams(&self) -> &[String] {
        self.index.teams()
    }

    pub fn contains(&self, team: &str) -> bool {
        self.index.get(team).is_some()
    }

    pub(crate) fn slot(&self, team: &str) -> Result<usize> {
        self.index.resolve(team)
    }

    pub(crate) fn attack_at(&self, slot: usize) -> f64 {
        self.attack[slot]
    }

    pub(crate) fn defence_at(&self, slot: usize) -> f64 {
        self.defence[slot]
    }

    pub fn rating(&self, team: &str) -> Result<TeamRating> {
        let slot = self.index.resolve(team)?;
        Ok(TeamRating {
            team: team.to_string(),
            attack: self.attack[slot],
            defence: self.defence[slot],
        })
    }

    pub fn ratings(&self) -> Vec<TeamRating> {
        self.index
            .teams()
            .iter()
            .enumerate()
            .map(|(i, team)| TeamRating {
                team: team.clone(),
                attack: self.attack[i],
                defence: self.defence[i],
            })
            .collect()
    }

    /// The `k` strongest attacks, strongest first; equal ratings keep alphabetical order.
    pub fn top_attacks(&self, k: usize) -> Vec<TeamRating> {
        let mut rows = self.ratings();
        rows.sort_by(|a, b| b.attack.total_cmp(&a.attack).then_with(|| a.team.cmp(&b.team)));
        rows.truncate(k);
        rows
    }

    pub fn mean_attack(&self) -> f64 {
        mean(&self.attack)
    }

    pub fn mean_defence(&self) -> f64 {
        mean(&self.defence)
    }

    pub fn home_advantage(&self) -> f64 {
        self.home_advantage
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn xi(&self) -> f64 {
        self.xi
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// False when the optimiser stopped before meeting its convergence criteria.
    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn mode(&self) -> Option<FitMode> {
        self.mode
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.artifact())?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let artifact: ParameterArtifact = serde_json::from_slice(bytes)?;
        Self::from_artifact(artifact)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, &self.artifact())?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let artifact: ParameterArtifact = serde_json::from_reader(reader)?;
        Self::from_artifact(artifact)
    }

    fn artifact(&self) -> ParameterArtifact {
        ParameterArtifact {
            version: PARAMS_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            mode: self.mode,
            fitted: self.fitted,
            converged: self.converged,
            home_advantage: self.home_advantage,
            rho: self.rho,
            xi: self.xi,
            ratings: self.ratings(),
        }
    }

    fn from_artifact(artifact: ParameterArtifact) -> Result<Self> {
        if artifact.version != PARAMS_VERSION {
            return Err(ModelError::UnsupportedVersion {
                found: artifact.version,
                expected: PARAMS_VERSION,
            });
        }
        let mut set = Self::from_ratings(
            artifact.ratings,
            artifact.home_advantage,
            artifact.rho,
            artifact.xi,
        )?;
        set.fitted = artifact.fitted;
        set.converged = artifact.converged;
        set.mode = artifact.mode;
        Ok(set)
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ModelError::InvalidParameter {
            name: name.to_string(),
            value,
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(team: &str, attack: f64, defence: f64) -> TeamRating {
        TeamRating {
            team: team.to_string(),
            attack,
            defence,
        }
    }

    #[test]
    fn ratings_are_reordered_alphabetically() {
        let set = ParameterSet::from_ratings(
            vec![rating("Roma", 1.1, 0.9), rating("Empoli", 0.8, 1.2)],
            1.25,
            0.03,
            0.0,
        )
        .unwrap();
        assert_eq!(set.teams(), &["Empoli", "Roma"]);
        assert_eq!(set.rating("Roma").unwrap().attack, 1.1);
        assert!(set.is_fitted());
    }

    #[test]
    fn non_positive_rating_is_rejected() {
        let err = ParameterSet::from_ratings(vec![rating("Roma", 0.0, 0.9)], 1.25, 0.0, 0.0)
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidParameter { .. }));
    }

    #[test]
    fn rho_outside_bounds_is_rejected() {
        let err = ParameterSet::from_ratings(vec![rating("Roma", 1.0, 1.0)], 1.25, 0.7, 0.0)
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidParameter { ref name, .. } if name == "rho"));
    }

    #[test]
    fn with_rating_returns_fresh_set() {
        let set = ParameterSet::from_ratings(
            vec![rating("Lecce", 0.9, 1.1), rating("Milan", 1.2, 0.9)],
            1.2,
            0.0,
            0.0,
        )
        .unwrap();
        let edited = set.with_rating("Lecce", 1.4, 1.0).unwrap();
        assert_eq!(set.rating("Lecce").unwrap().attack, 0.9);
        assert_eq!(edited.rating("Lecce").unwrap().attack, 1.4);
        assert!(set.with_rating("Pisa", 1.0, 1.0).is_err());
    }

    #[test]
    fn top_attacks_sorted_descending() {
        let set = ParameterSet::from_ratings(
            vec![
                rating("Como", 1.0, 1.0),
                rating("Inter", 1.4, 0.8),
                rating("Cagliari", 1.0, 1.1),
                rating("Verona", 0.7, 1.3),
            ],
            1.2,
            0.0,
            0.0,
        )
        .unwrap();
        let top: Vec<String> = set.top_attacks(3).into_iter().map(|r| r.team).collect();
        assert_eq!(top, vec!["Inter", "Cagliari", "Como"]);
    }

    #[test]
    fn version_mismatch_is_reported() {
        let set = ParameterSet::from_ratings(vec![rating("Roma", 1.0, 1.0)], 1.2, 0.0, 0.0).unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&set.to_bytes().unwrap()).unwrap();
        value["version"] = serde_json::json!(99);
        let err = ParameterSet::from_bytes(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn unfitted_flag_survives_round_trip() {
        let set = ParameterSet::unfitted(&["A", "B"], 1.3, 0.03, 0.0018);
        let back = ParameterSet::from_bytes(&set.to_bytes().unwrap()).unwrap();
        assert!(!back.is_fitted());
        assert_eq!(back.teams(), set.teams());
    }
}
