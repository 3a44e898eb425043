//! Domain error types.

/// Top-level error type for foresight.
#[derive(Debug, thiserror::Error)]
pub enum ForesightError {
    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("market data error: {reason}")]
    MarketData { reason: String },

    #[error("training failed for {model}: {reason}")]
    Training { model: String, reason: String },

    #[error("forecast error: {reason}")]
    Forecast { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&ForesightError> for std::process::ExitCode {
    fn from(err: &ForesightError) -> Self {
        let code: u8 = match err {
            ForesightError::Io(_) => 1,
            ForesightError::ConfigParse { .. }
            | ForesightError::ConfigMissing { .. }
            | ForesightError::ConfigInvalid { .. } => 2,
            ForesightError::Storage { .. } => 3,
            ForesightError::MarketData { .. } => 4,
            ForesightError::Training { .. } | ForesightError::Forecast { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
