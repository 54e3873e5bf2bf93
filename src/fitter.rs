use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ModelError, Result};
use crate::history::{MatchRecord, TeamIndex, resolve_pairs, time_weights};
use crate::optimizer::{Bounds, OptimizerConfig, minimize};
use crate::params::{ParameterSet, RHO_MAX, RHO_MIN};
use crate::scoreline::{dc_tau, ln_factorial};

pub const STRENGTH_MIN: f64 = 0.1;
pub const STRENGTH_MAX: f64 = 5.0;
pub const HOME_ADV_MIN: f64 = 1.0;
pub const HOME_ADV_MAX: f64 = 2.0;
pub const XG_HOME_ADV_MIN: f64 = 0.8;
pub const XG_HOME_ADV_MAX: f64 = 1.6;

/// Returned for any probe with a non-positive rate parameter.
pub const INFEASIBLE_PENALTY: f64 = 1e10;
/// Subtracted from the log-likelihood (unweighted) for each match whose `tau` is not positive.
pub const ZERO_PROB_PENALTY: f64 = 1e6;
/// Weight of the mean-attack / mean-defence anchor in the xG objective.
pub const SCALE_PENALTY: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Maximise the time-weighted Dixon-Coles log-likelihood of the observed scorelines.
    Goals,
    /// Least squares between model rates and per-match xG (goals where xG is missing).
    ExpectedGoals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Time-decay rate per day.
    pub xi: f64,
    pub time_decay: bool,
    /// Fixed team alphabet. When unset, the alphabet is every team named in the history.
    pub teams: Option<Vec<String>>,
    pub initial_home_advantage: f64,
    pub initial_rho: f64,
    pub optimizer: OptimizerConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            xi: 0.0018,
            time_decay: true,
            teams: None,
            initial_home_advantage: 1.2,
            initial_rho: 0.03,
            optimizer: OptimizerConfig::default(),
        }
    }
}

struct Observation {
    home: usize,
    away: usize,
    home_goals: u32,
    away_goals: u32,
    ln_factorials: f64,
    target: (f64, f64),
    weight: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Fitter {
    config: FitConfig,
}

impl Fitter {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn fit(&self, history: &[MatchRecord], mode: FitMode) -> Result<ParameterSet> {
        if history.is_empty() {
            return Err(ModelError::EmptyHistory);
        }
        let xi = if self.config.time_decay {
            self.config.xi
        } else {
            0.0
        };
        if !(xi >= 0.0 && xi.is_finite()) {
            return Err(ModelError::InvalidParameter {
                name: "xi".to_string(),
                value: xi,
            });
        }

        let index = match &self.config.teams {
            Some(teams) => TeamIndex::from_teams(teams),
            None => TeamIndex::from_history(history),
        };
        let pairs = resolve_pairs(history, &index)?;
        let weights = time_weights(history, xi);
        let observations: Vec<Observation> = history
            .iter()
            .zip(pairs)
            .zip(weights)
            .map(|((m, (home, away)), weight)| Observation {
                home,
                away,
                home_goals: m.home_goals,
                away_goals: m.away_goals,
                ln_factorials: ln_factorial(m.home_goals) + ln_factorial(m.away_goals),
                target: m.xg_targets(),
                weight,
            })
            .collect();

        let n = index.len();
        info!(
            matches = observations.len(),
            teams = n,
            ?mode,
            xi,
            "fitting Dixon-Coles parameters"
        );

        let mut bounds = Bounds::new();
        bounds.push(STRENGTH_MIN, STRENGTH_MAX, 2 * n);
        let mut x0 = vec![1.0; 2 * n];
        let minimum = match mode {
            FitMode::Goals => {
                bounds.push(HOME_ADV_MIN, HOME_ADV_MAX, 1);
                bounds.push(RHO_MIN, RHO_MAX, 1);
                x0.push(self.config.initial_home_advantage);
                x0.push(self.config.initial_rho);
                minimize(
                    |x: &[f64]| goal_objective(&observations, n, x),
                    &x0,
                    &bounds,
                    &self.config.optimizer,
                )
            }
            FitMode::ExpectedGoals => {
                bounds.push(XG_HOME_ADV_MIN, XG_HOME_ADV_MAX, 1);
                x0.push(self.config.initial_home_advantage);
                minimize(
                    |x: &[f64]| xg_objective(&observations, n, x),
                    &x0,
                    &bounds,
                    &self.config.optimizer,
                )
            }
        };

        debug!(
            termination = ?minimum.termination,
            evaluations = minimum.evaluations,
            objective = minimum.value,
            "optimiser finished"
        );
        let converged = minimum.converged();
        if !converged {
            warn!(
                termination = ?minimum.termination,
                iterations = minimum.iterations,
                "optimiser did not converge; keeping best parameters found"
            );
        }

        let x = minimum.x;
        let attack = x[..n].to_vec();
        let defence = x[n..2 * n].to_vec();
        let home_advantage = x[2 * n];
        let rho = match mode {
            FitMode::Goals => x[2 * n + 1],
            FitMode::ExpectedGoals => 0.0,
        };
        info!(
            iterations = minimum.iterations,
            home_advantage,
            rho,
            converged,
            "fit finished"
        );

        Ok(ParameterSet::from_fit(
            index,
            attack,
            defence,
            home_advantage,
            rho,
            xi,
            converged,
            mode,
        ))
    }
}

/// Layout of `x`: attack (n), defence (n), home advantage, rho.
fn goal_objective(observations: &[Observation], n: usize, x: &[f64]) -> f64 {
    let (attack, rest) = x.split_at(n);
    let (defence, globals) = rest.split_at(n);
    let (gamma, rho) = (globals[0], globals[1]);
    if gamma <= 0.0 || attack.iter().chain(defence).any(|v| *v <= 0.0) {
        return INFEASIBLE_PENALTY;
    }

    let mut log_likelihood = 0.0_f64;
    for o in observations {
        let lambda = attack[o.home] * defence[o.away] * gamma;
        let mu = attack[o.away] * defence[o.home];
        let tau = dc_tau(o.home_goals, o.away_goals, lambda, mu, rho);
        if tau > 0.0 {
            log_likelihood += o.weight
                * (o.home_goals as f64 * lambda.ln() - lambda + o.away_goals as f64 * mu.ln()
                    - mu
                    - o.ln_factorials
                    + tau.ln());
        } else {
            log_likelihood -= ZERO_PROB_PENALTY;
        }
    }
    -log_likelihood
}

/// Layout of `x`: attack (n), defence (n), home advantage.
fn xg_objective(observations: &[Observation], n: usize, x: &[f64]) -> f64 {
    let (attack, rest) = x.split_at(n);
    let (defence, globals) = rest.split_at(n);
    let gamma = globals[0];
    if gamma <= 0.0 || attack.iter().chain(defence).any(|v| *v <= 0.0) {
        return INFEASIBLE_PENALTY;
    }

    let mut loss = 0.0_f64;
    for o in observations {
        let lambda = attack[o.home] * defence[o.away] * gamma;
        let mu = attack[o.away] * defence[o.home];
        let (tx, ty) = o.target;
        loss += o.weight * ((lambda - tx).powi(2) + (mu - ty).powi(2));
    }
    let mean_attack = attack.iter().sum::<f64>() / n as f64;
    let mean_defence = defence.iter().sum::<f64>() / n as f64;
    loss + SCALE_PENALTY * ((mean_attack - 1.0).powi(2) + (mean_defence - 1.0).powi(2))
}
