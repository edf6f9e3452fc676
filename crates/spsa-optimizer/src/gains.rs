//! Decaying gain sequences.

use spsa_types::{SpsaConfig, SpsaError, SpsaResult};

/// Step-size and perturbation schedules derived from an [`SpsaConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainSchedule {
    config: SpsaConfig,
}

impl GainSchedule {
    pub fn new(config: SpsaConfig) -> SpsaResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SpsaConfig {
        &self.config
    }

    /// `a_k = a / (k + A)^alpha`
    pub fn a_k(&self, k: u64) -> f64 {
        self.config.a / (k as f64 + self.config.big_a).powf(self.config.alpha)
    }

    /// `c_k = c / k^gamma`
    pub fn c_k(&self, k: u64) -> f64 {
        self.config.c / (k as f64).powf(self.config.gamma)
    }

    /// Both gains for iteration `k`, rejecting `k = 0` and a perturbation that
    /// underflowed to zero or overflowed.
    pub fn gains(&self, k: u64) -> SpsaResult<(f64, f64)> {
        if k == 0 {
            return Err(SpsaError::OutOfSequence {
                expected: 1,
                got: 0,
            });
        }
        let c_k = self.c_k(k);
        if !c_k.is_finite() || c_k <= 0.0 {
            return Err(SpsaError::DegenerateConfig {
                field: "c_k".to_string(),
                value: c_k,
                message: format!("perturbation at k = {k} is not a positive finite number"),
            });
        }
        Ok((self.a_k(k), c_k))
    }
}
