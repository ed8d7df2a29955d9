//! The agent loop: plan, act, observe, learn.
//!
//! One run is a bounded sequence of oracle consultations and tool
//! invocations. Every step lands in the history regardless of outcome, the
//! run always terminates with a definite status, and after termination the
//! run is fed back into the learning store and the memory index.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use ironloop_config::AgentConfig;
use ironloop_core::error::OracleError;
use ironloop_core::{
    ActionRequest, AgentRunResult, Decision, ExecutionStep, Oracle, RunId, RunStatus, StepStatus,
    FINISH_TASK,
};
use ironloop_learning::LearningStore;
use ironloop_memory::{MemoryIndex, SearchHit};
use ironloop_tools::ToolDispatcher;

use crate::decision::parse_decision;

/// The agent loop with its collaborators injected.
///
/// Nothing here is global: the oracle, dispatcher, memory index, and
/// learning store are all explicit dependencies, so two loops with
/// different wiring can run side by side in one process.
pub struct AgentLoop {
    oracle: Arc<dyn Oracle>,
    dispatcher: Arc<ToolDispatcher>,
    memory: Option<Arc<MemoryIndex>>,
    learning: Arc<LearningStore>,
    config: AgentConfig,
}

impl AgentLoop {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        dispatcher: Arc<ToolDispatcher>,
        learning: Arc<LearningStore>,
        config: AgentConfig,
    ) -> Self {
        Self {
            oracle,
            dispatcher,
            memory: None,
            learning,
            config,
        }
    }

    /// Attach a memory index for pre-run recall and post-run archiving.
    pub fn with_memory(mut self, memory: Arc<MemoryIndex>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Drive the goal to completion or a bounded failure.
    ///
    /// The run ends with `Success` as soon as the oracle chooses
    /// `finish_task` (whatever that step's outcome), and with `Error` on
    /// parse exhaustion, too many consecutive failed steps, or the loop
    /// cap. The full step history travels with the result.
    pub async fn run(&self, goal: &str) -> AgentRunResult {
        let run_id = RunId::new();
        info!(run_id = %run_id, goal = %goal, oracle = %self.oracle.name(), "Starting agent run");

        let recall = match &self.memory {
            Some(memory) => memory.search(goal, self.config.recall_limit).await,
            None => Vec::new(),
        };
        if !recall.is_empty() {
            info!(run_id = %run_id, hits = recall.len(), "Recalled related runs from memory");
        }

        let catalog = self.dispatcher.catalog();
        let mut history: Vec<ExecutionStep> = Vec::new();
        let mut consecutive_failures = 0usize;
        let mut outcome: Option<(RunStatus, String, Option<String>)> = None;

        for _ in 0..self.config.max_loops {
            let summary = render_history(&history, &recall);

            let decision = match self.decide(goal, &summary, &catalog).await {
                Ok(decision) => decision,
                Err(e) => {
                    outcome = Some((
                        RunStatus::Error,
                        format!("Failed to parse agent decision: {e}"),
                        None,
                    ));
                    break;
                }
            };

            let step = self
                .act(&run_id, history.len() + 1, decision, &mut consecutive_failures)
                .await;
            // Choosing finish_task ends the run no matter how the step went;
            // the step result (an error string included) is the final answer.
            let finished = step.action.name == FINISH_TASK;
            let final_result = finished.then(|| step.result.clone());
            history.push(step);

            if finished {
                outcome = Some((
                    RunStatus::Success,
                    "Agent completed the goal.".to_string(),
                    final_result,
                ));
                break;
            }

            if consecutive_failures >= self.config.max_consecutive_failures {
                outcome = Some((
                    RunStatus::Error,
                    format!("Aborted after {consecutive_failures} consecutive failed steps."),
                    None,
                ));
                break;
            }
        }

        let (status, message, final_result) = outcome.unwrap_or((
            RunStatus::Error,
            "Agent reached maximum loops without finishing the goal.".to_string(),
            None,
        ));

        let result = AgentRunResult {
            run_id,
            status,
            message,
            history,
            final_result,
        };
        self.learn_from_run(goal, &result).await;
        info!(
            run_id = %result.run_id,
            status = ?result.status,
            steps = result.history.len(),
            "Agent run finished"
        );
        result
    }

    /// Consult the oracle, tolerating malformed output up to the configured
    /// number of parse attempts.
    async fn decide(
        &self,
        goal: &str,
        summary: &str,
        catalog: &std::collections::BTreeMap<String, String>,
    ) -> Result<Decision, OracleError> {
        let mut last = OracleError::Parse("no parse attempts configured".into());

        for attempt in 0..self.config.parse_attempts {
            match self.oracle.decide(goal, summary, catalog).await {
                Ok(text) => match parse_decision(&text) {
                    Ok(decision) => return Ok(decision),
                    Err(e) => {
                        warn!(attempt, error = %e, "Oracle output did not parse");
                        last = e;
                    }
                },
                Err(e) => {
                    warn!(attempt, error = %e, "Oracle call failed");
                    last = e;
                }
            }
            if attempt + 1 < self.config.parse_attempts {
                tokio::time::sleep(std::time::Duration::from_millis(
                    self.config.parse_retry_delay_ms,
                ))
                .await;
            }
        }
        Err(last)
    }

    /// Execute one decision and produce its step record.
    async fn act(
        &self,
        run_id: &RunId,
        step_number: usize,
        decision: Decision,
        consecutive_failures: &mut usize,
    ) -> ExecutionStep {
        let Some(action_name) = decision.action_name().map(str::to_string) else {
            *consecutive_failures += 1;
            warn!(run_id = %run_id, step = step_number, "Oracle produced an invalid action");
            return ExecutionStep {
                step: step_number,
                thought: decision.thought,
                action: ActionRequest {
                    name: String::new(),
                    params: json!({}),
                },
                result: "Error: agent generated an invalid action.".to_string(),
                status: StepStatus::Error,
            };
        };

        let params = decision
            .action
            .map(|a| a.params)
            .unwrap_or_else(|| json!({}));

        match self.dispatcher.invoke(&action_name, params.clone()).await {
            Ok(result) => {
                *consecutive_failures = 0;
                ExecutionStep {
                    step: step_number,
                    thought: decision.thought,
                    action: ActionRequest {
                        name: action_name,
                        params,
                    },
                    result,
                    status: StepStatus::Ok,
                }
            }
            Err(e) => {
                *consecutive_failures += 1;
                warn!(run_id = %run_id, step = step_number, tool = %action_name, error = %e, "Step failed");
                ExecutionStep {
                    step: step_number,
                    thought: decision.thought,
                    action: ActionRequest {
                        name: action_name.clone(),
                        params,
                    },
                    result: format!("Error executing tool '{action_name}': {e}"),
                    status: StepStatus::Error,
                }
            }
        }
    }

    /// Feed the finished run back into the learning store and memory index.
    async fn learn_from_run(&self, goal: &str, result: &AgentRunResult) {
        let success = result.status == RunStatus::Success;
        let failed_steps: Vec<&ExecutionStep> =
            result.history.iter().filter(|s| s.is_error()).collect();

        for step in &failed_steps {
            let context = json!({
                "tool_name": step.action.name,
                "params": step.action.params,
                "step": step.step,
            });
            if let Err(e) = self.learning.log_error(&step.result, context).await {
                warn!(error = %e, "Failed to record step error");
            }
        }

        let metrics = json!({
            "steps": result.history.len(),
            "failed_steps": failed_steps.len(),
        });
        if let Err(e) = self.learning.post_task_review(goal, success, metrics).await {
            warn!(error = %e, "Post-task review failed");
        }

        if let Some(memory) = &self.memory {
            memory
                .add_document(json!({
                    "run_id": result.run_id.to_string(),
                    "goal": goal,
                    "status": result.status,
                    "message": result.message,
                    "steps": result
                        .history
                        .iter()
                        .map(|s| json!({
                            "tool": s.action.name,
                            "result": s.result,
                            "status": s.status,
                        }))
                        .collect::<Vec<_>>(),
                }))
                .await;
        }
    }
}

/// Render the run so far for the oracle prompt.
fn render_history(history: &[ExecutionStep], recall: &[SearchHit]) -> String {
    let mut out = String::new();

    if !recall.is_empty() {
        out.push_str("Related past runs:\n");
        for (distance, payload) in recall {
            out.push_str(&format!("  - (distance {distance:.2}) {payload}\n"));
        }
        out.push('\n');
    }

    if history.is_empty() {
        out.push_str("  - No actions taken yet.");
    } else {
        let lines: Vec<String> = history
            .iter()
            .map(|h| {
                format!(
                    "  - Step {}: I used '{}' which resulted in: '{}'",
                    h.step, h.action.name, h.result
                )
            })
            .collect();
        out.push_str(&lines.join("\n"));
    }
    out
}
