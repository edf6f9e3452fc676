//! Objective evaluator abstraction.

use async_trait::async_trait;
use spsa_types::ParameterVector;
use std::sync::Arc;

/// Errors surfaced by an objective evaluator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("evaluator failed: {message}")]
    Failed { message: String },
    #[error("evaluator timed out after {timeout_ms} ms")]
    TimedOut { timeout_ms: u64 },
}

impl EvaluationError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Result alias for evaluator calls.
pub type EvaluationResult = Result<f64, EvaluationError>;

/// Scores a parameter vector; higher is better.
///
/// Implementations may be noisy and slow (playing matches, running a
/// benchmark). The optimizer calls [`evaluate`](Self::evaluate) twice per
/// iteration and awaits both calls together, so an implementation that can
/// serve concurrent requests gets both probes in flight at once.
#[async_trait]
pub trait ObjectiveEvaluator: Send + Sync {
    async fn evaluate(&self, params: &ParameterVector) -> EvaluationResult;
}

#[async_trait]
impl<E: ObjectiveEvaluator + ?Sized> ObjectiveEvaluator for Arc<E> {
    async fn evaluate(&self, params: &ParameterVector) -> EvaluationResult {
        (**self).evaluate(params).await
    }
}

#[async_trait]
impl<E: ObjectiveEvaluator + ?Sized> ObjectiveEvaluator for Box<E> {
    async fn evaluate(&self, params: &ParameterVector) -> EvaluationResult {
        (**self).evaluate(params).await
    }
}

/// Adapts a synchronous scoring closure.
pub struct FnEvaluator<F> {
    f: F,
}

impl<F> FnEvaluator<F>
where
    F: Fn(&ParameterVector) -> f64 + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ObjectiveEvaluator for FnEvaluator<F>
where
    F: Fn(&ParameterVector) -> f64 + Send + Sync,
{
    async fn evaluate(&self, params: &ParameterVector) -> EvaluationResult {
        Ok((self.f)(params))
    }
}
