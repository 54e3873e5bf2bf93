use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ModelError, Result};
use crate::evaluation::Prob3;
use crate::params::ParameterSet;
use crate::scoreline::{DEFAULT_MAX_GOALS, ScoreGrid};

/// Per-side multipliers applied to the expected-goal rates (1.0 = no adjustment).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormFactors {
    pub home: f64,
    pub away: f64,
}

impl Default for FormFactors {
    fn default() -> Self {
        Self {
            home: 1.0,
            away: 1.0,
        }
    }
}

impl FormFactors {
    pub fn new(home: f64, away: f64) -> Self {
        Self { home, away }
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [("form.home", self.home), ("form.away", self.away)] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ModelError::InvalidParameter {
                    name: name.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastBundle {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
    pub over_25: f64,
    pub under_25: f64,
    pub btts_yes: f64,
    pub btts_no: f64,
    pub expected_home_goals: f64,
    pub expected_away_goals: f64,
    pub modal_score: (u32, u32),
    pub modal_probability: f64,
    /// Negative mass clamped away while building the grid.
    pub clamped_mass: f64,
    /// The grid underflowed and was rebuilt as a fallback table (see `ScoreGrid::is_degenerate`).
    #[serde(default)]
    pub degenerate: bool,
    pub fit_converged: bool,
}

impl ForecastBundle {
    pub fn from_grid(grid: &ScoreGrid, fit_converged: bool) -> Self {
        let outcome = grid.outcome_probs();
        let over_25 = grid.over_25();
        let btts_no = grid.btts_no();
        let (modal_score, modal_probability) = grid.modal_score();
        Self {
            home_win: outcome.home,
            draw: outcome.draw,
            away_win: outcome.away,
            over_25,
            under_25: 1.0 - over_25,
            btts_yes: 1.0 - btts_no,
            btts_no,
            expected_home_goals: grid.lambda_home(),
            expected_away_goals: grid.lambda_away(),
            modal_score,
            modal_probability,
            clamped_mass: grid.clamped_mass(),
            degenerate: grid.is_degenerate(),
            fit_converged,
        }
    }

    pub fn outcome_probs(&self) -> Prob3 {
        Prob3 {
            home: self.home_win,
            draw: self.draw,
            away: self.away_win,
        }
    }
}

/// Turns a fitted parameter set into fixture forecasts.
///
/// Rates are `lambda = attack[home] * defence[away] * gamma * form.home` and
/// `mu = attack[away] * defence[home] / gamma * form.away`. The fitter never applies `gamma` to
/// the away rate, while forecasts divide the away rate by it: the two are deliberately
/// asymmetric and forecasts built from the same parameters as the fit will put slightly fewer
/// goals on the away side than the fitted likelihood did.
#[derive(Debug, Clone)]
pub struct Forecaster {
    params: Arc<ParameterSet>,
    max_goals: u32,
}

impl Forecaster {
    pub fn new(params: Arc<ParameterSet>) -> Self {
        Self {
            params,
            max_goals: DEFAULT_MAX_GOALS,
        }
    }

    pub fn with_max_goals(mut self, max_goals: u32) -> Self {
        self.max_goals = max_goals;
        self
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Expected goals `(lambda, mu)` for the fixture.
    pub fn rates(&self, home: &str, away: &str, form: FormFactors) -> Result<(f64, f64)> {
        if !self.params.is_fitted() {
            return Err(ModelError::UnfittedModel);
        }
        let h = self.params.slot(home)?;
        let a = self.params.slot(away)?;
        form.validate()?;

        let gamma = self.params.home_advantage();
        let lambda = self.params.attack_at(h) * self.params.defence_at(a) * gamma * form.home;
        let mu = self.params.attack_at(a) * self.params.defence_at(h) * (1.0 / gamma) * form.away;
        Ok((lambda, mu))
    }

    pub fn scoreline_grid(&self, home: &str, away: &str, form: FormFactors) -> Result<ScoreGrid> {
        let (lambda, mu) = self.rates(home, away, form)?;
        let grid = ScoreGrid::build(lambda, mu, self.params.rho(), self.max_goals);
        if grid.clamped_mass() > 0.0 {
            debug!(
                home,
                away,
                clamped = grid.clamped_mass(),
                "scoreline grid needed clamping"
            );
        }
        if grid.is_degenerate() {
            warn!(home, away, lambda, mu, "scoreline grid underflowed, using fallback table");
        }
        Ok(grid)
    }

    pub fn forecast(&self, home: &str, away: &str) -> Result<ForecastBundle> {
        self.forecast_with_form(home, away, FormFactors::default())
    }

    pub fn forecast_with_form(
        &self,
        home: &str,
        away: &str,
        form: FormFactors,
    ) -> Result<ForecastBundle> {
        let grid = self.scoreline_grid(home, away, form)?;
        Ok(ForecastBundle::from_grid(&grid, self.params.converged()))
    }
}
