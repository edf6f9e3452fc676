use async_trait::async_trait;
use spsa_optimizer::{EvaluationError, EvaluationResult, ObjectiveEvaluator};
use spsa_types::ParameterVector;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::config::CommandConfig;

/// Scores a probe by running an external program.
///
/// Each parameter is passed as `--Name=value` after the configured
/// arguments. The child is killed if the timeout elapses or the evaluation
/// is dropped.
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    config: CommandConfig,
}

impl CommandEvaluator {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    fn command(&self, params: &ParameterVector) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .args(params.iter().map(|(name, value)| format!("--{name}={value}")))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ObjectiveEvaluator for CommandEvaluator {
    async fn evaluate(&self, params: &ParameterVector) -> EvaluationResult {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        debug!(program = %self.config.program, params = %params, "Spawning evaluator");

        let output = tokio::time::timeout(timeout, self.command(params).output())
            .await
            .map_err(|_| EvaluationError::TimedOut {
                timeout_ms: self.config.timeout_ms,
            })?
            .map_err(|e| {
                EvaluationError::failed(format!("failed to run {}: {e}", self.config.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EvaluationError::failed(format!(
                "{} exited with {}: {}",
                self.config.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_score(&String::from_utf8_lossy(&output.stdout))
    }
}

/// The score is the last non-empty line of output.
fn parse_score(stdout: &str) -> EvaluationResult {
    let line = stdout
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .ok_or_else(|| EvaluationError::failed("evaluator printed no score"))?;
    line.parse::<f64>()
        .map_err(|e| EvaluationError::failed(format!("unparseable score '{line}': {e}")))
}
