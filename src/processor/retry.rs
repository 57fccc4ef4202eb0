//! Retry policy for agent calls
//!
//! Every attempt runs under a timeout. Transport failures, timeouts and
//! malformed responses are all retried with the same request, backing off
//! exponentially between attempts.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use super::cancel::CancellationToken;
use crate::agent::{AgentClient, AgentError, AgentRequest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Limit on a single agent call
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, given `attempt` failures so far.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exp);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        Duration::from_millis(millis.min(self.max_backoff.as_millis() as f64) as u64)
    }
}

/// A successful call and how many attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryError {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: AgentError },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

/// Call the agent until `parse` accepts a response or the budget runs out.
pub async fn call_with_retry<T, P>(
    agent: &dyn AgentClient,
    request: &AgentRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    parse: P,
) -> Result<Retried<T>, RetryError>
where
    P: Fn(&str) -> Result<T, AgentError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match tokio::time::timeout(policy.timeout, agent.call(request)).await {
            Ok(Ok(text)) => parse(&text),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AgentError::Timeout(policy.timeout)),
        };

        let error = match result {
            Ok(value) => {
                return Ok(Retried {
                    value,
                    attempts: attempt,
                })
            }
            Err(e) => e,
        };

        warn!(task = %request.task, attempt, max_attempts, error = %error, "agent call failed");

        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts: attempt });
        }

        tokio::time::sleep(policy.backoff(attempt)).await;
    }
}
