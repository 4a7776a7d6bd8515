//! Backoff tiers for retryable jobs.

use crate::error::{Result, WorkflowError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy expressed as a list of backoff tiers and an attempt ceiling.
///
/// The delay after the n-th failed attempt is `tiers[n - 1]`; once the list
/// runs out the last tier is reused. A job is abandoned after
/// `max_attempts` executions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    tiers: Vec<Duration>,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(tiers: Vec<Duration>, max_attempts: u32) -> Result<Self> {
        if tiers.is_empty() {
            return Err(WorkflowError::InvalidRetryPolicy(
                "at least one backoff tier is required".to_string(),
            ));
        }
        if max_attempts == 0 {
            return Err(WorkflowError::InvalidRetryPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            tiers,
            max_attempts,
        })
    }

    pub fn from_secs(tiers: &[u64], max_attempts: u32) -> Result<Self> {
        Self::new(
            tiers.iter().copied().map(Duration::from_secs).collect(),
            max_attempts,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn tiers(&self) -> &[Duration] {
        &self.tiers
    }

    /// Delay before the next attempt, or `None` when `attempts_made` has
    /// reached the ceiling.
    pub fn next_delay(&self, attempts_made: u32) -> Option<Duration> {
        if attempts_made == 0 || attempts_made >= self.max_attempts {
            return None;
        }
        let index = usize::try_from(attempts_made - 1).unwrap_or(usize::MAX);
        self.tiers
            .get(index)
            .or_else(|| self.tiers.last())
            .copied()
    }
}

impl Default for RetryPolicy {
    /// 1m, 5m, 10m, 30m with five attempts in total.
    fn default() -> Self {
        Self {
            tiers: vec![
                Duration::from_secs(60),
                Duration::from_secs(300),
                Duration::from_secs(600),
                Duration::from_secs(1800),
            ],
            max_attempts: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_walks_the_tiers_then_stops() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(1), Some(Duration::from_secs(60)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_secs(300)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_secs(600)));
        assert_eq!(policy.next_delay(4), Some(Duration::from_secs(1800)));
        assert_eq!(policy.next_delay(5), None);
    }

    #[test]
    fn last_tier_repeats_when_attempts_exceed_tiers() {
        let policy = RetryPolicy::from_secs(&[10], 4).unwrap();
        assert_eq!(policy.next_delay(1), Some(Duration::from_secs(10)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_secs(10)));
        assert_eq!(policy.next_delay(4), None);
    }

    #[test]
    fn rejects_degenerate_policies() {
        assert!(RetryPolicy::new(Vec::new(), 3).is_err());
        assert!(RetryPolicy::from_secs(&[60], 0).is_err());
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let policy = RetryPolicy::from_secs(&[60], 1).unwrap();
        assert_eq!(policy.next_delay(1), None);
    }
}
