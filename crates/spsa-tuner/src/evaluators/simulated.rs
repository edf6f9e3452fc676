use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use spsa_optimizer::{EvaluationError, EvaluationResult, ObjectiveEvaluator};
use spsa_types::{config_error, ParameterVector, SpsaResult};
use std::sync::Mutex;

use crate::config::SimulatedMatchConfig;

/// Noisy synthetic match score peaking at one parameter's target value.
#[derive(Debug)]
pub struct SimulatedMatch {
    config: SimulatedMatchConfig,
    noise: Normal<f64>,
    rng: Mutex<ChaCha8Rng>,
}

impl SimulatedMatch {
    pub fn new(config: SimulatedMatchConfig) -> SpsaResult<Self> {
        let noise = Normal::new(0.0, config.noise_sd)
            .map_err(|e| config_error!("noise_sd {} rejected: {e}", config.noise_sd))?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(Self {
            config,
            noise,
            rng: Mutex::new(rng),
        })
    }
}

#[async_trait]
impl ObjectiveEvaluator for SimulatedMatch {
    async fn evaluate(&self, params: &ParameterVector) -> EvaluationResult {
        let value = params.get(&self.config.target_param).ok_or_else(|| {
            EvaluationError::failed(format!(
                "parameter '{}' missing from probe",
                self.config.target_param
            ))
        })?;

        let noise = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.noise.sample(&mut *rng)
        };
        let distance = (value - self.config.target).abs();
        Ok(self.config.base_score - self.config.weight * distance + noise)
    }
}
