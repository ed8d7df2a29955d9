//! `ironloop status` — Show effective configuration.

use ironloop_config::AppConfig;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    println!("Ironloop Status");
    println!("===============");
    println!("  Failure threshold:    {}", config.resilience.failure_threshold);
    println!("  Recovery timeout:     {}s", config.resilience.recovery_timeout_secs);
    println!("  Max retries:          {}", config.resilience.max_retries);
    println!("  Retry delay:          {}ms (capped at {}ms)",
        config.resilience.initial_retry_delay_ms,
        config.resilience.max_retry_delay_ms);
    println!("  Max loops:            {}", config.agent.max_loops);
    println!("  Consecutive failures: {}", config.agent.max_consecutive_failures);
    println!("  Parse attempts:       {}", config.agent.parse_attempts);
    println!("  Embedding dimension:  {}", config.embedding.dimension);
    println!(
        "  Remote embedder:      {}",
        if config.embedding.base_url.is_empty() {
            "disabled"
        } else {
            &config.embedding.base_url
        }
    );
    println!(
        "  Embedding keys:       {} configured",
        config.embedding.api_keys.len()
    );
    println!(
        "  Learning:             {} ({})",
        if config.learning.enabled { "enabled" } else { "disabled" },
        config.learning.path
    );

    if config.rate_limits.is_empty() {
        println!("  Rate limits:          none configured");
    } else {
        for (key, limit) in &config.rate_limits {
            println!(
                "  Rate limit [{key}]:    {} requests / {}s",
                limit.max_requests, limit.window_seconds
            );
        }
    }

    Ok(())
}
