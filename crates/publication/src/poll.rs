//! Bounded polling for state that becomes visible asynchronously.
//!
//! The catalog indexes harvested files in the background and staged files
//! may land on a network share, so "did it work" is answered by probing
//! repeatedly with exponential backoff instead of sleeping a fixed time.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityPolicy {
    /// Probes before giving up, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    8
}

fn default_initial_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    4000
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl VisibilityPolicy {
    /// Delay before probe `attempt` (1-based; the first probe is immediate).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let mut delay = self.initial_delay_ms;
        for _ in 2..attempt {
            delay = (delay.saturating_mul(2)).min(self.max_delay_ms);
        }
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Probe until `probe` returns true or the attempts run out.
    pub async fn wait_until<F, Fut>(&self, what: &str, mut probe: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for attempt in 1..=self.max_attempts {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if probe().await {
                debug!(what, attempt, "Visible");
                return true;
            }
            debug!(what, attempt, max_attempts = self.max_attempts, "Not visible yet");
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast(max_attempts: u32) -> VisibilityPolicy {
        VisibilityPolicy {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = VisibilityPolicy {
            max_attempts: 10,
            initial_delay_ms: 100,
            max_delay_ms: 500,
        };
        let delays: Vec<u64> = (1..=6)
            .map(|a| policy.delay_before(a).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![0, 100, 200, 400, 500, 500]);
    }

    #[tokio::test]
    async fn test_wait_until_succeeds_after_retries() {
        let calls = Cell::new(0u32);
        let visible = fast(5)
            .wait_until("granule", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { n >= 3 }
            })
            .await;
        assert!(visible);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_wait_until_gives_up() {
        let calls = Cell::new(0u32);
        let visible = fast(4)
            .wait_until("granule", || {
                calls.set(calls.get() + 1);
                async { false }
            })
            .await;
        assert!(!visible);
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_defaults_from_partial_yaml() {
        let policy: VisibilityPolicy = serde_yaml::from_str("max_attempts: 3").unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay_ms, 250);
        assert_eq!(policy.max_delay_ms, 4000);
    }
}
