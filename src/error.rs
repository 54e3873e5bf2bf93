use thiserror::Error;

/// Errors surfaced by the fitter, forecaster and parameter import/export.
///
/// Non-fatal conditions are not errors: a fit that stops before convergence is flagged on the
/// resulting `ParameterSet`, and clamped scoreline mass is reported on the forecast itself.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no match records supplied")]
    EmptyHistory,

    #[error("unknown team: {team}")]
    UnknownTeam { team: String },

    #[error("model has not been fitted or loaded")]
    UnfittedModel,

    #[error("invalid match record #{index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: String, value: f64 },

    #[error("parameter stream error: {0}")]
    Persistence(String),

    #[error("unsupported parameter stream version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Persistence(err.to_string())
    }
}
