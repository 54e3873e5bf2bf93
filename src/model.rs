use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::error::Result;
use crate::fitter::{FitConfig, FitMode, Fitter};
use crate::forecast::{ForecastBundle, Forecaster, FormFactors};
use crate::history::MatchRecord;
use crate::params::ParameterSet;

/// Shared handle to the current parameter set.
///
/// Readers take a cheap `Arc` snapshot and keep using it even if a new fit is swapped in
/// meanwhile; the swap itself only replaces the pointer.
#[derive(Debug)]
pub struct DixonColesModel {
    fitter: Fitter,
    current: RwLock<Arc<ParameterSet>>,
}

impl Default for DixonColesModel {
    fn default() -> Self {
        Self::new(FitConfig::default())
    }
}

impl DixonColesModel {
    pub fn new(config: FitConfig) -> Self {
        let teams = config.teams.clone().unwrap_or_default();
        let placeholder = ParameterSet::unfitted(
            &teams,
            config.initial_home_advantage,
            config.initial_rho,
            config.xi,
        );
        Self {
            fitter: Fitter::new(config),
            current: RwLock::new(Arc::new(placeholder)),
        }
    }

    pub fn with_params(config: FitConfig, params: ParameterSet) -> Self {
        Self {
            fitter: Fitter::new(config),
            current: RwLock::new(Arc::new(params)),
        }
    }

    pub fn config(&self) -> &FitConfig {
        self.fitter.config()
    }

    pub fn snapshot(&self) -> Arc<ParameterSet> {
        Arc::clone(&*self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Installs `params` and returns the set it replaced.
    pub fn replace(&self, params: ParameterSet) -> Arc<ParameterSet> {
        self.install(Arc::new(params))
    }

    fn install(&self, next: Arc<ParameterSet>) -> Arc<ParameterSet> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    /// Fits in `mode` and swaps the result in. On error the current set is left untouched.
    pub fn fit(&self, history: &[MatchRecord], mode: FitMode) -> Result<Arc<ParameterSet>> {
        let params = Arc::new(self.fitter.fit(history, mode)?);
        self.install(Arc::clone(&params));
        Ok(params)
    }

    /// Fits against xG when any record carries it, against goals otherwise.
    pub fn train(&self, history: &[MatchRecord]) -> Result<Arc<ParameterSet>> {
        let mode = if history.iter().any(|m| m.xg.is_some()) {
            FitMode::ExpectedGoals
        } else {
            FitMode::Goals
        };
        info!(?mode, matches = history.len(), "training model");
        self.fit(history, mode)
    }

    pub fn forecaster(&self) -> Forecaster {
        Forecaster::new(self.snapshot())
    }

    pub fn forecast(&self, home: &str, away: &str) -> Result<ForecastBundle> {
        self.forecaster().forecast(home, away)
    }

    pub fn forecast_with_form(
        &self,
        home: &str,
        away: &str,
        form: FormFactors,
    ) -> Result<ForecastBundle> {
        self.forecaster().forecast_with_form(home, away, form)
    }

    pub fn export(&self) -> Result<Vec<u8>> {
        self.snapshot().to_bytes()
    }

    /// Loads a serialised set and swaps it in. A stream that fails to parse leaves the current
    /// set in place.
    pub fn import(&self, bytes: &[u8]) -> Result<Arc<ParameterSet>> {
        let params = Arc::new(ParameterSet::from_bytes(bytes)?);
        self.install(Arc::clone(&params));
        Ok(params)
    }
}
