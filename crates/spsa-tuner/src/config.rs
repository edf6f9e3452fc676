//! Startup configuration for a tuning run.

use serde::{Deserialize, Serialize};
use spsa_optimizer::RunBudget;
use spsa_types::{config_error, FailurePolicy, SearchSpace, SpsaConfig, SpsaResult};
use std::path::Path;
use std::time::Duration;

fn default_iterations() -> u64 {
    100
}

/// Everything a run reads once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Parameters to tune, in logging order.
    pub parameters: SearchSpace,

    #[serde(default)]
    pub hyperparameters: SpsaConfig,

    /// Iteration budget.
    #[serde(default = "default_iterations")]
    pub iterations: u64,

    /// Seed for the perturbation draws. Fresh entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Optional wall-clock limit in seconds.
    #[serde(default)]
    pub time_budget_secs: Option<u64>,

    #[serde(default)]
    pub evaluator: EvaluatorConfig,
}

impl TuningConfig {
    pub fn new(parameters: SearchSpace) -> Self {
        Self {
            parameters,
            hyperparameters: SpsaConfig::default(),
            iterations: default_iterations(),
            seed: None,
            failure_policy: FailurePolicy::default(),
            time_budget_secs: None,
            evaluator: EvaluatorConfig::default(),
        }
    }

    /// The continuation-history scales of the search, with the simulated
    /// match as objective.
    pub fn continuation_history() -> Self {
        let space = SearchSpace::new()
            .add_parameter("ContinuationHistoryScale", 0.0, 4.0, 1.0, 1.0)
            .add_parameter("ContinuationHistory1PlyScale", 0.0, 4.0, 1.0, 1.0)
            .add_parameter("ContinuationHistoryMovePickScale", 1.0, 1024.0, 10.0, 256.0)
            .add_parameter("ContinuationHistory1PlyMovePickScale", 1.0, 1024.0, 10.0, 256.0);
        Self::new(space)
    }

    pub fn from_file(path: impl AsRef<Path>) -> SpsaResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_hyperparameters(mut self, hyperparameters: SpsaConfig) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_evaluator(mut self, evaluator: EvaluatorConfig) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn validate(&self) -> SpsaResult<()> {
        self.parameters.validate()?;
        self.hyperparameters.validate()?;
        if self.iterations == 0 {
            return Err(config_error!("iterations must be positive"));
        }
        if self.time_budget_secs == Some(0) {
            return Err(config_error!("time_budget_secs must be positive when set"));
        }
        self.evaluator.validate(&self.parameters)
    }

    pub fn budget(&self) -> RunBudget {
        let budget = RunBudget::iterations(self.iterations);
        match self.time_budget_secs {
            Some(secs) => budget.with_time_budget(Duration::from_secs(secs)),
            None => budget,
        }
    }
}

/// Which objective to score probes with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluatorConfig {
    SimulatedMatch(SimulatedMatchConfig),
    Command(CommandConfig),
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self::SimulatedMatch(SimulatedMatchConfig::default())
    }
}

impl EvaluatorConfig {
    fn validate(&self, space: &SearchSpace) -> SpsaResult<()> {
        match self {
            Self::SimulatedMatch(cfg) => {
                if space.get(&cfg.target_param).is_none() {
                    return Err(config_error!(
                        "simulated match targets unknown parameter '{}'",
                        cfg.target_param
                    ));
                }
                if !cfg.noise_sd.is_finite() || cfg.noise_sd < 0.0 {
                    return Err(config_error!(
                        "noise_sd must be finite and non-negative, got {}",
                        cfg.noise_sd
                    ));
                }
                Ok(())
            }
            Self::Command(cfg) => {
                if cfg.program.trim().is_empty() {
                    return Err(config_error!("command evaluator needs a program"));
                }
                if cfg.timeout_ms == 0 {
                    return Err(config_error!("command timeout must be positive"));
                }
                Ok(())
            }
        }
    }
}

/// Stand-in objective: a base score that falls off linearly with the distance
/// of one parameter from a target, plus Gaussian noise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedMatchConfig {
    pub target_param: String,
    pub target: f64,
    pub base_score: f64,
    pub weight: f64,
    pub noise_sd: f64,
    /// Seed for the noise. Fresh entropy when absent.
    pub seed: Option<u64>,
}

impl Default for SimulatedMatchConfig {
    fn default() -> Self {
        Self {
            target_param: "ContinuationHistoryScale".to_string(),
            target: 2.0,
            base_score: 0.5,
            weight: 0.1,
            noise_sd: 0.05,
            seed: None,
        }
    }
}

/// External scorer: run `program args... --Name=value...` and read the score
/// from the last non-empty line of stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    600_000
}
