//! Per-iteration records and run bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spsa_types::ParameterVector;
use std::time::Duration;
use uuid::Uuid;

/// Unique tuning run identifier.
pub type RunId = Uuid;

/// Everything observable about one completed iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration index.
    pub k: u64,
    pub a_k: f64,
    pub c_k: f64,
    /// Perturbation direction, one ±1 per parameter.
    pub delta: ParameterVector,
    /// Probes as the evaluator saw them (already clipped).
    pub theta_plus: ParameterVector,
    pub theta_minus: ParameterVector,
    pub y_plus: f64,
    pub y_minus: f64,
    /// Scalar gradient estimate shared by every dimension.
    pub g_hat: f64,
    /// Parameter vector after the update.
    pub params: ParameterVector,
    /// Perturbation draws needed, including failed ones.
    pub attempts: u32,
}

/// When a caller-driven run should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunBudget {
    pub max_iterations: u64,
    /// Wall-clock limit, checked between iterations.
    pub time_budget: Option<Duration>,
}

impl RunBudget {
    pub fn iterations(max_iterations: u64) -> Self {
        Self {
            max_iterations,
            time_budget: None,
        }
    }

    pub fn with_time_budget(mut self, limit: Duration) -> Self {
        self.time_budget = Some(limit);
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    TimeBudgetExhausted,
    Interrupted,
    /// An iteration failed for good; the report holds everything before it.
    Failed { error: String },
}

/// Outcome of a tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningReport {
    pub id: RunId,
    pub status: RunStatus,
    pub initial: ParameterVector,
    pub params: ParameterVector,
    /// Iterations completed during this run.
    pub iterations: u64,
    /// Failed evaluation attempts that were retried with a fresh draw.
    pub skipped: u64,
    pub records: Vec<IterationRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TuningReport {
    pub fn new(initial: ParameterVector) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: RunStatus::Running,
            params: initial.clone(),
            initial,
            iterations: 0,
            skipped: 0,
            records: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn push(&mut self, record: IterationRecord) {
        self.iterations += 1;
        self.skipped += u64::from(record.attempts.saturating_sub(1));
        self.params = record.params.clone();
        self.records.push(record);
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Error text of a failed run.
    pub fn failure(&self) -> Option<&str> {
        match &self.status {
            RunStatus::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Record with the larger of its two probe scores, if any iteration ran.
    pub fn best_probe(&self) -> Option<(&IterationRecord, f64)> {
        self.records
            .iter()
            .map(|r| (r, r.y_plus.max(r.y_minus)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }
}
