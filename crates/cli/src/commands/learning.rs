//! `ironloop learning` — Inspect the self-learning store.

use std::sync::Arc;

use ironloop_config::AppConfig;
use ironloop_learning::LearningStore;
use ironloop_resilience::{CircuitBreaker, CircuitBreakerConfig};

pub async fn run(config: AppConfig, full: bool) -> anyhow::Result<()> {
    let breaker = Arc::new(CircuitBreaker::new(
        "learning",
        CircuitBreakerConfig::from(&config.resilience),
    ));
    let store = LearningStore::open(config.learning.clone(), breaker, None)?;

    let counts = store.counts().await;
    println!("Learning store ({})", config.learning.path);
    println!("  knowledge:    {}", counts.knowledge);
    println!("  errors:       {}", counts.errors);
    println!("  improvements: {}", counts.improvements);

    if full {
        let file = store.dump().await;
        if !file.errors.is_empty() {
            println!("\nErrors:");
            for record in &file.errors {
                println!("  [{}] {}", record.timestamp, record.error);
            }
        }
        if !file.improvements.is_empty() {
            println!("\nImprovements:");
            for record in &file.improvements {
                println!(
                    "  [{}] {:?} (confidence {:.2}, applied: {}) {}",
                    record.timestamp,
                    record.kind,
                    record.confidence,
                    record.applied,
                    record.fix.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}
