use shiftgen_config::ConfigError;
use shiftgen_core::ShiftError;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Shift(#[from] ShiftError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0} not found")]
    NotFound(String),
}

impl AppError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Shift(ShiftError::Configuration(message.into()))
    }

    pub fn as_shift(&self) -> Option<&ShiftError> {
        match self {
            Self::Shift(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_missing_target() {
        let error = AppError::NotFound("shift 42".to_owned());
        assert_eq!(error.to_string(), "shift 42 not found");
        assert!(error.as_shift().is_none());
    }

    #[test]
    fn configuration_wraps_shift_error() {
        let error = AppError::configuration("missing site");
        assert!(matches!(
            error.as_shift(),
            Some(ShiftError::Configuration(message)) if message == "missing site"
        ));
    }
}
