//! `ironloop run` — Drive a goal through the agent loop.

use std::path::Path;
use std::sync::Arc;

use ironloop_agent::AgentLoop;
use ironloop_config::AppConfig;
use ironloop_core::StepStatus;
use ironloop_learning::LearningStore;
use ironloop_memory::MemoryIndex;
use ironloop_resilience::{CircuitBreakerConfig, CircuitBreakerRegistry, RateLimiter};
use ironloop_tools::ToolDispatcher;

use crate::scripted::ScriptedOracle;

pub async fn run(config: AppConfig, goal: &str, script: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(script)?;
    let oracle = ScriptedOracle::from_json(&content)?;

    let breaker_defaults = CircuitBreakerConfig::from(&config.resilience);
    let breakers = Arc::new(CircuitBreakerRegistry::new(breaker_defaults.clone()));
    let limiter = Arc::new(RateLimiter::new(breaker_defaults));
    let learning = Arc::new(LearningStore::open(
        config.learning.clone(),
        breakers.get_or_create("learning"),
        None,
    )?);
    let memory = Arc::new(MemoryIndex::from_config(
        config.embedding.clone(),
        breakers.get_or_create("embedding"),
    ));

    let dispatcher = Arc::new(ToolDispatcher::new(
        config.resilience.clone(),
        config.rate_limits.clone(),
        breakers.clone(),
        limiter,
        learning.clone(),
    ));

    let agent = AgentLoop::new(Arc::new(oracle), dispatcher, learning, config.agent.clone())
        .with_memory(memory);
    let result = agent.run(goal).await;

    println!("Run {} finished: {:?}", result.run_id, result.status);
    println!("  {}", result.message);
    for step in &result.history {
        let marker = match step.status {
            StepStatus::Ok => "ok",
            StepStatus::Error => "err",
        };
        println!(
            "  step {:>2} [{marker:>3}] {} -> {}",
            step.step, step.action.name, step.result
        );
    }
    if let Some(answer) = &result.final_result {
        println!("Final answer: {answer}");
    }

    println!("\nCircuit breakers:");
    for snapshot in breakers.status() {
        println!(
            "  {:<20} {:?} (failures: {})",
            snapshot.name, snapshot.state, snapshot.failure_count
        );
    }

    Ok(())
}
