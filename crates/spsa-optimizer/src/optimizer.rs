//! The SPSA iteration loop.

use spsa_types::{
    FailurePolicy, ParameterVector, Probe, SearchSpace, SpsaConfig, SpsaError, SpsaResult,
};
use std::future::Future;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::evaluator::{EvaluationResult, ObjectiveEvaluator};
use crate::gains::GainSchedule;
use crate::perturbation::{PerturbationSource, Rademacher};
use crate::report::{IterationRecord, RunBudget, RunStatus, TuningReport};

/// Bounded stochastic-gradient ascent driven by two evaluations per step.
///
/// The optimizer owns the running estimate. An iteration computes the updated
/// vector on the side and commits it in one assignment after both probes have
/// been scored, so dropping an in-flight [`run_iteration`](Self::run_iteration)
/// future leaves the estimate exactly as it was.
pub struct SpsaOptimizer {
    space: SearchSpace,
    schedule: GainSchedule,
    policy: FailurePolicy,
    perturbation: Box<dyn PerturbationSource>,
    theta: ParameterVector,
    completed: u64,
}

/// Outcome of a single perturbation draw that reached the update step.
struct Attempt {
    delta: Vec<f64>,
    theta_plus: ParameterVector,
    theta_minus: ParameterVector,
    y_plus: f64,
    y_minus: f64,
    g_hat: f64,
    next: ParameterVector,
}

impl SpsaOptimizer {
    /// Validate the search space and hyperparameters and start every
    /// parameter at its default. Directions are drawn from an
    /// entropy-seeded source until [`with_seed`](Self::with_seed) or
    /// [`with_perturbation`](Self::with_perturbation) replaces it.
    pub fn new(space: SearchSpace, config: SpsaConfig) -> SpsaResult<Self> {
        space.validate()?;
        let schedule = GainSchedule::new(config)?;
        let theta = space.defaults();

        Ok(Self {
            space,
            schedule,
            policy: FailurePolicy::default(),
            perturbation: Box::new(Rademacher::from_entropy()),
            theta,
            completed: 0,
        })
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_perturbation(Rademacher::seeded(seed))
    }

    pub fn with_perturbation(mut self, source: impl PerturbationSource + 'static) -> Self {
        self.perturbation = Box::new(source);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current estimate.
    pub fn params(&self) -> &ParameterVector {
        &self.theta
    }

    /// Number of iterations completed so far.
    pub fn iteration(&self) -> u64 {
        self.completed
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn config(&self) -> &SpsaConfig {
        self.schedule.config()
    }

    /// Run iteration `k`, which must be exactly one past the last completed
    /// iteration.
    pub async fn run_iteration<E>(&mut self, k: u64, evaluator: &E) -> SpsaResult<IterationRecord>
    where
        E: ObjectiveEvaluator + ?Sized,
    {
        let expected = self.completed + 1;
        if k != expected {
            return Err(SpsaError::OutOfSequence { expected, got: k });
        }
        let (a_k, c_k) = self.schedule.gains(k)?;

        let max_attempts = self.policy.max_attempts();
        let mut attempts = 1;
        let attempt = loop {
            match self.attempt(k, c_k, a_k, evaluator).await {
                Ok(attempt) => break attempt,
                Err(err) if err.is_per_iteration() && attempts < max_attempts => {
                    warn!(k, attempts, max_attempts, error = %err, "Evaluation failed, redrawing perturbation");
                    attempts += 1;
                }
                Err(err) => return Err(err),
            }
        };

        let delta: ParameterVector = self
            .space
            .iter()
            .zip(&attempt.delta)
            .map(|(p, d)| (p.name.clone(), *d))
            .collect();

        self.theta = attempt.next;
        self.completed = k;

        info!(
            k,
            a_k,
            c_k,
            y_plus = attempt.y_plus,
            y_minus = attempt.y_minus,
            g_hat = attempt.g_hat,
            params = %self.theta,
            "SPSA iteration complete"
        );

        Ok(IterationRecord {
            k,
            a_k,
            c_k,
            delta,
            theta_plus: attempt.theta_plus,
            theta_minus: attempt.theta_minus,
            y_plus: attempt.y_plus,
            y_minus: attempt.y_minus,
            g_hat: attempt.g_hat,
            params: self.theta.clone(),
            attempts,
        })
    }

    /// Run the next iteration in sequence.
    pub async fn step<E>(&mut self, evaluator: &E) -> SpsaResult<IterationRecord>
    where
        E: ObjectiveEvaluator + ?Sized,
    {
        self.run_iteration(self.completed + 1, evaluator).await
    }

    /// Iterate until the budget is spent.
    pub async fn run<E>(&mut self, evaluator: &E, budget: &RunBudget) -> TuningReport
    where
        E: ObjectiveEvaluator + ?Sized,
    {
        self.run_until(evaluator, budget, std::future::pending::<()>())
            .await
    }

    /// Iterate until the budget is spent or `shutdown` resolves. An iteration
    /// in flight when `shutdown` fires is abandoned and leaves the estimate
    /// untouched.
    ///
    /// An iteration that fails after the failure policy is exhausted ends the
    /// run with [`RunStatus::Failed`]. Iterations completed before it stay in
    /// the report and in the optimizer.
    pub async fn run_until<E, S>(
        &mut self,
        evaluator: &E,
        budget: &RunBudget,
        shutdown: S,
    ) -> TuningReport
    where
        E: ObjectiveEvaluator + ?Sized,
        S: Future<Output = ()>,
    {
        let mut report = TuningReport::new(self.theta.clone());
        let started = Instant::now();
        tokio::pin!(shutdown);

        info!(
            run_id = %report.id,
            parameters = self.space.len(),
            max_iterations = budget.max_iterations,
            start_k = self.completed + 1,
            "Starting SPSA run"
        );

        let mut status = RunStatus::Completed;
        for _ in 0..budget.max_iterations {
            if let Some(limit) = budget.time_budget {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    info!(elapsed = ?elapsed, "Time budget exhausted");
                    status = RunStatus::TimeBudgetExhausted;
                    break;
                }
            }

            let next_k = self.completed + 1;
            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(k = next_k, "Run interrupted, discarding in-flight iteration");
                    status = RunStatus::Interrupted;
                    break;
                }
                result = self.step(evaluator) => result,
            };
            match outcome {
                Ok(record) => report.push(record),
                Err(err) => {
                    error!(k = next_k, error = %err, "Iteration failed, ending run");
                    status = RunStatus::Failed {
                        error: err.to_string(),
                    };
                    break;
                }
            }
        }

        report.finish(status);
        info!(
            run_id = %report.id,
            status = ?report.status,
            iterations = report.iterations,
            skipped = report.skipped,
            best_score = ?report.best_probe().map(|(_, score)| score),
            params = %report.params,
            "SPSA run finished"
        );
        report
    }

    async fn attempt<E>(&mut self, k: u64, c_k: f64, a_k: f64, evaluator: &E) -> SpsaResult<Attempt>
    where
        E: ObjectiveEvaluator + ?Sized,
    {
        let delta = self.perturbation.draw(self.space.len());

        let theta_plus = self.shifted(&delta, c_k);
        let theta_minus = self.shifted(&delta, -c_k);
        debug!(k, theta_plus = %theta_plus, theta_minus = %theta_minus, "Evaluating probes");

        let (plus, minus) = tokio::join!(
            evaluator.evaluate(&theta_plus),
            evaluator.evaluate(&theta_minus)
        );
        let y_plus = finite_score(k, Probe::Plus, plus)?;
        let y_minus = finite_score(k, Probe::Minus, minus)?;

        // Unclipped c_k in the denominator even when a probe hit a bound.
        let g_hat = (y_plus - y_minus) / (2.0 * c_k);
        let next = self.shifted(&delta, a_k * g_hat);

        Ok(Attempt {
            delta,
            theta_plus,
            theta_minus,
            y_plus,
            y_minus,
            g_hat,
            next,
        })
    }

    /// `clip(theta + scale * delta)`
    fn shifted(&self, delta: &[f64], scale: f64) -> ParameterVector {
        self.space.clipped(
            self.theta
                .values()
                .zip(delta)
                .map(|(value, d)| value + scale * d),
        )
    }
}

impl std::fmt::Debug for SpsaOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpsaOptimizer")
            .field("space", &self.space)
            .field("config", self.schedule.config())
            .field("policy", &self.policy)
            .field("theta", &self.theta)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

fn finite_score(k: u64, probe: Probe, result: EvaluationResult) -> SpsaResult<f64> {
    match result {
        Ok(score) if score.is_finite() => Ok(score),
        Ok(score) => Err(SpsaError::ObjectiveEvaluation {
            iteration: k,
            probe,
            message: format!("non-finite score {score}"),
        }),
        Err(err) => Err(SpsaError::ObjectiveEvaluation {
            iteration: k,
            probe,
            message: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvaluationError, FnEvaluator};
    use crate::perturbation::FixedPerturbation;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn single(min: f64, max: f64, default: f64) -> SearchSpace {
        SearchSpace::new().add_parameter("x", min, max, 1.0, default)
    }

    fn x_of(v: &ParameterVector) -> f64 {
        v.get("x").unwrap()
    }

    /// Fails the first `failures` calls, then scores `-(x - 2)^2`. A failed
    /// call returns `bad_score` when set and an error otherwise.
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
        bad_score: Option<f64>,
    }

    #[async_trait]
    impl ObjectiveEvaluator for Flaky {
        async fn evaluate(&self, params: &ParameterVector) -> EvaluationResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return self
                    .bad_score
                    .ok_or_else(|| EvaluationError::failed("engine crashed"));
            }
            let x = params.get("x").unwrap_or(0.0);
            Ok(-(x - 2.0).powi(2))
        }
    }

    #[test]
    fn new_starts_at_defaults() {
        let space = SearchSpace::new()
            .add_parameter("a", 0.0, 4.0, 1.0, 1.0)
            .add_parameter("b", 1.0, 1024.0, 10.0, 256.0);
        let opt = SpsaOptimizer::new(space.clone(), SpsaConfig::default()).unwrap();
        assert_eq!(opt.params(), &space.defaults());
        assert_eq!(opt.iteration(), 0);
    }

    #[test]
    fn new_rejects_invalid_spec_before_config() {
        let space = single(4.0, 0.0, 1.0);
        let cfg = SpsaConfig::default().with_perturbation_scale(0.0);
        assert!(matches!(
            SpsaOptimizer::new(space, cfg),
            Err(SpsaError::InvalidSpec { .. })
        ));
    }

    #[test]
    fn new_rejects_degenerate_config() {
        let cfg = SpsaConfig::default().with_perturbation_scale(0.0);
        assert!(matches!(
            SpsaOptimizer::new(single(0.0, 4.0, 1.0), cfg),
            Err(SpsaError::DegenerateConfig { .. })
        ));
    }

    #[tokio::test]
    async fn single_iteration_matches_hand_computation() {
        let mut opt = SpsaOptimizer::new(single(0.0, 4.0, 1.0), SpsaConfig::default())
            .unwrap()
            .with_perturbation(FixedPerturbation::constant(vec![1.0]));
        let eval = FnEvaluator::new(|p: &ParameterVector| -(x_of(p) - 2.0).powi(2));

        let rec = opt.run_iteration(1, &eval).await.unwrap();

        // c_1 = 1: probes at 2 and 0, scores 0 and -4, g = 4 / 2 = 2.
        assert_eq!(x_of(&rec.theta_plus), 2.0);
        assert_eq!(x_of(&rec.theta_minus), 0.0);
        assert_eq!(rec.y_plus, 0.0);
        assert_eq!(rec.y_minus, -4.0);
        assert_eq!(rec.g_hat, 2.0);
        let a_1 = 2.0 / 101f64.powf(0.602);
        assert!((x_of(opt.params()) - (1.0 + 2.0 * a_1)).abs() < 1e-12);
        assert_eq!(rec.params, *opt.params());
        assert_eq!(rec.delta.get("x"), Some(1.0));
        assert_eq!(rec.attempts, 1);
        assert_eq!(opt.iteration(), 1);
    }

    #[tokio::test]
    async fn probes_are_clipped_but_denominator_is_not() {
        // At the upper bound, theta+ is clipped to 4 while theta- moves a full c_k.
        let mut opt = SpsaOptimizer::new(single(0.0, 4.0, 4.0), SpsaConfig::default())
            .unwrap()
            .with_perturbation(FixedPerturbation::constant(vec![1.0]));
        let eval = FnEvaluator::new(|p: &ParameterVector| x_of(p));

        let rec = opt.step(&eval).await.unwrap();
        assert_eq!(x_of(&rec.theta_plus), 4.0);
        assert_eq!(x_of(&rec.theta_minus), 3.0);
        assert_eq!(rec.g_hat, (4.0 - 3.0) / 2.0);
    }

    #[tokio::test]
    async fn out_of_sequence_is_rejected_without_side_effects() {
        let mut opt = SpsaOptimizer::new(single(0.0, 4.0, 1.0), SpsaConfig::default())
            .unwrap()
            .with_seed(3);
        let eval = FnEvaluator::new(|p: &ParameterVector| x_of(p));

        for bad in [0, 2] {
            let err = opt.run_iteration(bad, &eval).await.unwrap_err();
            assert!(matches!(err, SpsaError::OutOfSequence { expected: 1, got } if got == bad));
        }
        opt.run_iteration(1, &eval).await.unwrap();
        assert!(opt.run_iteration(1, &eval).await.is_err());
        assert_eq!(opt.iteration(), 1);
    }

    #[tokio::test]
    async fn non_finite_score_aborts_and_keeps_vector() {
        let mut opt = SpsaOptimizer::new(single(0.0, 4.0, 1.0), SpsaConfig::default())
            .unwrap()
            .with_seed(9);
        let eval = Flaky {
            failures: 1,
            calls: AtomicUsize::new(0),
            bad_score: Some(f64::NAN),
        };

        let err = opt.step(&eval).await.unwrap_err();
        match err {
            SpsaError::ObjectiveEvaluation { iteration, message, .. } => {
                assert_eq!(iteration, 1);
                assert!(message.contains("non-finite"));
            }
            other => panic!("expected ObjectiveEvaluation, got {other:?}"),
        }
        assert_eq!(x_of(opt.params()), 1.0);
        assert_eq!(opt.iteration(), 0);
    }

    #[tokio::test]
    async fn infinite_scores_abort_and_keep_vector() {
        for bad in [f64::INFINITY, f64::NEG_INFINITY] {
            let mut opt = SpsaOptimizer::new(single(0.0, 4.0, 1.0), SpsaConfig::default())
                .unwrap()
                .with_perturbation(FixedPerturbation::constant(vec![1.0]));
            // Probes land at 2 and 0; only the minus side is broken.
            let eval = FnEvaluator::new(move |p: &ParameterVector| {
                let x = x_of(p);
                if x < 1.0 {
                    bad
                } else {
                    x
                }
            });

            match opt.step(&eval).await {
                Err(SpsaError::ObjectiveEvaluation { iteration, probe, message }) => {
                    assert_eq!(iteration, 1);
                    assert_eq!(probe, Probe::Minus);
                    assert!(message.contains("non-finite"), "{message}");
                }
                other => panic!("expected ObjectiveEvaluation, got {other:?}"),
            }
            assert_eq!(x_of(opt.params()), 1.0);
            assert_eq!(opt.iteration(), 0);
        }
    }

    #[tokio::test]
    async fn retry_policy_recovers_from_nan_scores() {
        let mut opt = SpsaOptimizer::new(single(0.0, 4.0, 1.0), SpsaConfig::default())
            .unwrap()
            .with_perturbation(FixedPerturbation::new(vec![vec![-1.0], vec![1.0]]))
            .with_failure_policy(FailurePolicy::Retry { max_attempts: 2 });
        // Both probes of the first draw score NaN.
        let eval = Flaky {
            failures: 2,
            calls: AtomicUsize::new(0),
            bad_score: Some(f64::NAN),
        };

        let rec = opt.step(&eval).await.unwrap();
        assert_eq!(rec.attempts, 2);
        assert!(rec.y_plus.is_finite() && rec.y_minus.is_finite());
        assert!(rec.g_hat.is_finite());
        assert!(x_of(opt.params()).is_finite());
        assert!(x_of(opt.params()) > 1.0);
        assert_eq!(opt.iteration(), 1);
    }

    #[tokio::test]
    async fn retry_policy_redraws_and_recovers() {
        let mut opt = SpsaOptimizer::new(single(0.0, 4.0, 1.0), SpsaConfig::default())
            .unwrap()
            .with_perturbation(FixedPerturbation::new(vec![vec![-1.0], vec![1.0]]))
            .with_failure_policy(FailurePolicy::Retry { max_attempts: 3 });
        // Both probes of the first draw fail.
        let eval = Flaky {
            failures: 2,
            calls: AtomicUsize::new(0),
            bad_score: None,
        };

        let rec = opt.step(&eval).await.unwrap();
        assert_eq!(rec.k, 1);
        assert_eq!(rec.attempts, 2);
        assert_eq!(rec.delta.get("x"), Some(1.0));
        assert!(x_of(opt.params()) > 1.0);
    }

    #[tokio::test]
    async fn retry_policy_gives_up_after_max_attempts() {
        let mut opt = SpsaOptimizer::new(single(0.0, 4.0, 1.0), SpsaConfig::default())
            .unwrap()
            .with_seed(1)
            .with_failure_policy(FailurePolicy::Retry { max_attempts: 2 });
        let eval = Flaky {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
            bad_score: None,
        };

        let err = opt.step(&eval).await.unwrap_err();
        assert!(err.is_per_iteration());
        assert_eq!(eval.calls.load(Ordering::SeqCst), 4);
        assert_eq!(opt.params(), &opt.space().defaults());
    }

    #[tokio::test]
    async fn run_respects_iteration_budget() {
        let mut opt = SpsaOptimizer::new(single(0.0, 4.0, 1.0), SpsaConfig::default())
            .unwrap()
            .with_seed(11);
        let eval = FnEvaluator::new(|p: &ParameterVector| -(x_of(p) - 2.0).powi(2));

        let report = opt.run(&eval, &RunBudget::iterations(25)).await;
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.iterations, 25);
        assert_eq!(report.records.len(), 25);
        assert_eq!(report.records.last().map(|r| r.k), Some(25));
        assert_eq!(&report.params, opt.params());
        assert_eq!(opt.iteration(), 25);

        // A second run continues the same k sequence.
        let more = opt.run(&eval, &RunBudget::iterations(5)).await;
        assert_eq!(more.records.first().map(|r| r.k), Some(26));
        assert_eq!(opt.iteration(), 30);
    }

    #[tokio::test]
    async fn zero_time_budget_runs_nothing() {
        let mut opt = SpsaOptimizer::new(single(0.0, 4.0, 1.0), SpsaConfig::default())
            .unwrap()
            .with_seed(5);
        let eval = FnEvaluator::new(|p: &ParameterVector| x_of(p));
        let budget = RunBudget::iterations(10).with_time_budget(std::time::Duration::ZERO);

        let report = opt.run(&eval, &budget).await;
        assert_eq!(report.status, RunStatus::TimeBudgetExhausted);
        assert_eq!(report.iterations, 0);
        assert_eq!(opt.params(), &opt.space().defaults());
    }

    #[tokio::test]
    async fn ready_shutdown_interrupts_before_first_iteration() {
        let mut opt = SpsaOptimizer::new(single(0.0, 4.0, 1.0), SpsaConfig::default())
            .unwrap()
            .with_seed(5);
        let eval = FnEvaluator::new(|p: &ParameterVector| x_of(p));

        let report = opt
            .run_until(&eval, &RunBudget::iterations(10), std::future::ready(()))
            .await;
        assert_eq!(report.status, RunStatus::Interrupted);
        assert_eq!(report.iterations, 0);
        assert_eq!(opt.iteration(), 0);
    }
}
