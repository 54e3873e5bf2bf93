//! Dixon-Coles rating, forecasting and forecast evaluation for league football.

pub mod error;
pub mod evaluation;
pub mod fitter;
pub mod forecast;
pub mod form;
pub mod history;
pub mod model;
pub mod optimizer;
pub mod params;
pub mod scoreline;
pub mod synthetic;

pub use error::{ModelError, Result};
pub use evaluation::{EvaluationRecord, EvaluationReport, FinalScore, Outcome, Prob3};
pub use fitter::{FitConfig, FitMode, Fitter};
pub use forecast::{ForecastBundle, Forecaster, FormFactors};
pub use history::MatchRecord;
pub use model::DixonColesModel;
pub use params::{ParameterSet, TeamRating};
pub use scoreline::ScoreGrid;
