// Queue configuration shared by the server and any engine-side consumer

use crate::queue::Backoff;

pub const DEFAULT_QUEUE_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_WORK_CHANNEL: &str = "autograde";
pub const DEFAULT_REPORT_CHANNEL: &str = "report";

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub url: String,
    /// Channel that carries submissions to the execution engine
    pub work_channel: String,
    /// Channel the execution engine publishes results on
    pub report_channel: String,
    pub backoff: Backoff,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_QUEUE_URL.to_string(),
            work_channel: DEFAULT_WORK_CHANNEL.to_string(),
            report_channel: DEFAULT_REPORT_CHANNEL.to_string(),
            backoff: Backoff::default(),
        }
    }
}

impl QueueConfig {
    /// `QUEUE_URL` (falling back to `REDIS_URL`), `AUTOGRADER_QUEUE`, `REPORT_QUEUE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            url: var("QUEUE_URL").or_else(|| var("REDIS_URL")).unwrap_or(defaults.url),
            work_channel: var("AUTOGRADER_QUEUE").unwrap_or(defaults.work_channel),
            report_channel: var("REPORT_QUEUE").unwrap_or(defaults.report_channel),
            backoff: defaults.backoff,
        }
    }
}
