//! Engine configuration loaded from environment variables.

use std::time::Duration;

use restack_core::retry::RetryConfig;

/// Tunables for the conversion engine.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum tasks dispatched concurrently per job (default: `3`).
    pub max_concurrent: usize,
    /// Retry policy for transient task failures.
    pub retry: RetryConfig,
    /// Per-task timeout on the conversion service call (default: `120s`).
    pub task_timeout: Duration,
    /// When `true`, pausing a job aborts in-flight tasks instead of
    /// letting them finish (default: `false`).
    pub hard_cancel_on_pause: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            retry: RetryConfig::default(),
            task_timeout: Duration::from_secs(120),
            hard_cancel_on_pause: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default |
    /// |-------------------------|---------|
    /// | `MAX_CONCURRENT_TASKS`  | `3`     |
    /// | `MAX_TASK_RETRIES`      | `3`     |
    /// | `RETRY_BASE_DELAY_MS`   | `500`   |
    /// | `RETRY_MAX_DELAY_SECS`  | `30`    |
    /// | `TASK_TIMEOUT_SECS`     | `120`   |
    /// | `HARD_CANCEL_ON_PAUSE`  | `false` |
    pub fn from_env() -> Self {
        let max_concurrent: usize = std::env::var("MAX_CONCURRENT_TASKS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("MAX_CONCURRENT_TASKS must be a valid usize");

        let max_retries: u32 = std::env::var("MAX_TASK_RETRIES")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("MAX_TASK_RETRIES must be a valid u32");

        let base_delay_ms: u64 = std::env::var("RETRY_BASE_DELAY_MS")
            .unwrap_or_else(|_| "500".into())
            .parse()
            .expect("RETRY_BASE_DELAY_MS must be a valid u64");

        let max_delay_secs: u64 = std::env::var("RETRY_MAX_DELAY_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("RETRY_MAX_DELAY_SECS must be a valid u64");

        let task_timeout_secs: u64 = std::env::var("TASK_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("TASK_TIMEOUT_SECS must be a valid u64");

        let hard_cancel_on_pause = std::env::var("HARD_CANCEL_ON_PAUSE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            // A zero limit would deadlock the dispatch loop.
            max_concurrent: max_concurrent.max(1),
            retry: RetryConfig {
                max_retries,
                base_delay: Duration::from_millis(base_delay_ms),
                max_delay: Duration::from_secs(max_delay_secs),
            },
            task_timeout: Duration::from_secs(task_timeout_secs),
            hard_cancel_on_pause,
        }
    }
}
