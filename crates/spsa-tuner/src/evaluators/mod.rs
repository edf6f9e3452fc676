//! Concrete objective evaluators selectable from configuration.

mod command;
mod simulated;

pub use command::CommandEvaluator;
pub use simulated::SimulatedMatch;

use spsa_optimizer::ObjectiveEvaluator;
use spsa_types::SpsaResult;

use crate::config::EvaluatorConfig;

/// Instantiate the evaluator a configuration asks for.
pub fn build_evaluator(config: &EvaluatorConfig) -> SpsaResult<Box<dyn ObjectiveEvaluator>> {
    Ok(match config {
        EvaluatorConfig::SimulatedMatch(cfg) => Box::new(SimulatedMatch::new(cfg.clone())?),
        EvaluatorConfig::Command(cfg) => Box::new(CommandEvaluator::new(cfg.clone())),
    })
}
