use thiserror::Error;

/// Main error type for the SPSA tuner
#[derive(Error, Debug)]
pub enum SpsaError {
    #[error("Invalid parameter spec '{parameter}': {message}")]
    InvalidSpec { parameter: String, message: String },

    #[error("Degenerate configuration: {field} = {value}, {message}")]
    DegenerateConfig {
        field: String,
        value: f64,
        message: String,
    },

    #[error("Objective evaluation failed at iteration {iteration} ({probe} probe): {message}")]
    ObjectiveEvaluation {
        iteration: u64,
        probe: Probe,
        message: String,
    },

    #[error("Iteration out of sequence: expected k = {expected}, got k = {got}")]
    OutOfSequence { expected: u64, got: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SpsaError {
    /// Whether the error belongs to a single iteration rather than the run
    /// as a whole. Only these are eligible for a retry.
    pub fn is_per_iteration(&self) -> bool {
        matches!(self, SpsaError::ObjectiveEvaluation { .. })
    }
}

/// Which side of the simultaneous perturbation a score belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Plus,
    Minus,
}

impl std::fmt::Display for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plus => write!(f, "theta+"),
            Self::Minus => write!(f, "theta-"),
        }
    }
}

/// Result type alias for SPSA operations
pub type SpsaResult<T> = Result<T, SpsaError>;

/// Macro for creating parameter spec errors
#[macro_export]
macro_rules! invalid_spec {
    ($param:expr, $($arg:tt)*) => {
        $crate::SpsaError::InvalidSpec {
            parameter: ($param).to_string(),
            message: format!($($arg)*),
        }
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::SpsaError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SpsaError::InvalidSpec {
            parameter: "ContinuationHistoryScale".to_string(),
            message: "min 4 is greater than max 0".to_string(),
        };

        assert!(error.to_string().contains("ContinuationHistoryScale"));
        assert!(error.to_string().contains("min 4"));
    }

    #[test]
    fn test_evaluation_error_names_probe() {
        let error = SpsaError::ObjectiveEvaluation {
            iteration: 7,
            probe: Probe::Minus,
            message: "score is NaN".to_string(),
        };

        let text = error.to_string();
        assert!(text.contains("iteration 7"));
        assert!(text.contains("theta-"));
        assert!(error.is_per_iteration());
    }

    #[test]
    fn test_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "tune.json");
        let err: SpsaError = io.into();

        match err {
            SpsaError::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
        assert!(!SpsaError::Config("x".into()).is_per_iteration());
    }

    #[test]
    fn test_macros() {
        let spec_err = invalid_spec!("x", "default {} outside [{}, {}]", 5.0, 0.0, 4.0);
        assert!(spec_err.to_string().contains("default 5 outside [0, 4]"));

        let config_err = config_error!("iterations must be positive, got {}", 0);
        assert!(matches!(config_err, SpsaError::Config(_)));
    }
}
