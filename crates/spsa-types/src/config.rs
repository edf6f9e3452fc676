//! SPSA hyperparameters and evaluation failure policy.

use serde::{Deserialize, Serialize};

use crate::errors::{SpsaError, SpsaResult};

/// Gain-sequence hyperparameters.
///
/// `a_k = a / (k + A)^alpha` and `c_k = c / k^gamma`. The defaults are the
/// classic Spall values with a stability offset suited to a few hundred
/// iterations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpsaConfig {
    /// Step-size scale.
    pub a: f64,
    /// Perturbation scale.
    pub c: f64,
    /// Stability offset added to `k` in the step-size denominator.
    #[serde(rename = "A")]
    pub big_a: f64,
    /// Step-size decay exponent.
    pub alpha: f64,
    /// Perturbation decay exponent.
    pub gamma: f64,
}

impl Default for SpsaConfig {
    fn default() -> Self {
        Self {
            a: 2.0,
            c: 1.0,
            big_a: 100.0,
            alpha: 0.602,
            gamma: 0.101,
        }
    }
}

impl SpsaConfig {
    pub fn new(a: f64, c: f64, big_a: f64, alpha: f64, gamma: f64) -> Self {
        Self {
            a,
            c,
            big_a,
            alpha,
            gamma,
        }
    }

    pub fn with_step_scale(mut self, a: f64) -> Self {
        self.a = a;
        self
    }

    pub fn with_perturbation_scale(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_stability(mut self, big_a: f64) -> Self {
        self.big_a = big_a;
        self
    }

    pub fn with_exponents(mut self, alpha: f64, gamma: f64) -> Self {
        self.alpha = alpha;
        self.gamma = gamma;
        self
    }

    /// Reject settings that would make a gain zero, negative or non-finite.
    pub fn validate(&self) -> SpsaResult<()> {
        let degenerate = |field: &str, value: f64, message: &str| SpsaError::DegenerateConfig {
            field: field.to_string(),
            value,
            message: message.to_string(),
        };

        if !self.c.is_finite() || self.c <= 0.0 {
            return Err(degenerate(
                "c",
                self.c,
                "perturbation scale must be positive and finite",
            ));
        }
        if !self.a.is_finite() || self.a <= 0.0 {
            return Err(degenerate(
                "a",
                self.a,
                "step scale must be positive and finite",
            ));
        }
        if !self.big_a.is_finite() || self.big_a < 0.0 {
            return Err(degenerate(
                "A",
                self.big_a,
                "stability offset must be non-negative and finite",
            ));
        }
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(degenerate(
                "alpha",
                self.alpha,
                "decay exponent must be non-negative and finite",
            ));
        }
        if !self.gamma.is_finite() || self.gamma < 0.0 {
            return Err(degenerate(
                "gamma",
                self.gamma,
                "decay exponent must be non-negative and finite",
            ));
        }
        Ok(())
    }
}

/// What to do when the evaluator fails or returns a non-finite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Surface the error; the parameter vector is left untouched.
    Abort,
    /// Redraw the perturbation and evaluate the same iteration again, up to
    /// `max_attempts` attempts in total.
    Retry { max_attempts: u32 },
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::Abort
    }
}

impl FailurePolicy {
    /// Total attempts allowed for one iteration.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::Abort => 1,
            Self::Retry { max_attempts } => (*max_attempts).max(1),
        }
    }
}
