//! Retry policy configuration for tasks.
//!
//! Fixed-delay retry with a configurable attempt cap. The delay is
//! deliberately constant per attempt, not exponential.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial failure (0 = no retries).
    pub max_retries: u32,

    /// Fixed delay before each retry, in milliseconds on the wire.
    #[serde(with = "serde_millis")]
    pub delay: Duration,
}

impl RetryPolicy {
    /// A policy with no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// A fixed-delay policy.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Whether another retry may be scheduled after `retry_count` failures.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }
}

impl Default for RetryPolicy {
    /// Default policy: no retries.
    fn default() -> Self {
        Self::none()
    }
}

/// Serde helper: Duration as whole milliseconds.
mod serde_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
