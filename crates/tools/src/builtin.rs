//! Built-in tools.

use async_trait::async_trait;

use ironloop_core::error::ToolError;
use ironloop_core::{Tool, FINISH_TASK};

/// The termination tool: calling it ends the run successfully.
///
/// The loop treats a successful `finish_task` step as the run's final
/// answer, so this tool just hands back its `final_answer` parameter.
pub struct FinishTaskTool;

#[async_trait]
impl Tool for FinishTaskTool {
    fn name(&self) -> &str {
        FINISH_TASK
    }

    fn description(&self) -> &str {
        "Call this when the goal is accomplished. Pass the final answer in 'final_answer'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "final_answer": {
                    "type": "string",
                    "description": "The final answer or summary of what was accomplished"
                }
            },
            "required": ["final_answer"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String, ToolError> {
        Ok(params["final_answer"]
            .as_str()
            .unwrap_or("Task completed.")
            .to_string())
    }
}
