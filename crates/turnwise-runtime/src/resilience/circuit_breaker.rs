//! Circuit breaker around judge calls.
//!
//! After repeated judge failures the circuit opens and calls fail fast with
//! [`JudgeError::CircuitOpen`](crate::judge::JudgeError::CircuitOpen).
//! Precondition calls then drop to their keyword heuristic; rule calls
//! surface as JudgeUnavailable.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::duration_str;
use crate::judge::JudgeCall;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// How long an open circuit waits before letting a probe through
    #[serde(with = "duration_str")]
    pub recovery_timeout: Duration,

    /// Probe successes needed to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// State of one circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitState {
    Closed { failures: u32 },

    Open { opened_at: Instant },

    HalfOpen { successes: u32 },
}

/// One circuit per [`JudgeCall`] kind, so a failing precondition prompt
/// does not block rule judgments.
pub struct CircuitBreaker {
    states: RwLock<HashMap<JudgeCall, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether calls of this kind should fail fast.
    pub fn is_open(&self, call: JudgeCall) -> bool {
        let states = self.states.read();
        match states.get(&call) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(call);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_success(&self, call: JudgeCall) {
        let mut states = self.states.write();
        match states.get(&call).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(call, CircuitState::Closed { failures: 0 });
                    tracing::info!(call = %call, "Judge circuit closed");
                } else {
                    states.insert(
                        call,
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(call, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, call: JudgeCall) {
        let mut states = self.states.write();
        let failures = match states.get(&call) {
            Some(CircuitState::Closed { failures }) => failures + 1,
            None => 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    call,
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(call = %call, "Judge circuit reopened after failed probe");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                call,
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(call = %call, failures, "Judge circuit opened after repeated failures");
        } else {
            states.insert(call, CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, call: JudgeCall) {
        let mut states = self.states.write();
        if matches!(states.get(&call), Some(CircuitState::Open { .. })) {
            states.insert(call, CircuitState::HalfOpen { successes: 0 });
            tracing::info!(call = %call, "Judge circuit half-open, probing");
        }
    }

    pub fn state(&self, call: JudgeCall) -> CircuitState {
        self.states
            .read()
            .get(&call)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, recovery_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout,
            success_threshold: 1,
        })
    }

    #[test]
    fn test_starts_closed() {
        let cb = CircuitBreaker::default();
        assert!(!cb.is_open(JudgeCall::Rule));
        assert_eq!(cb.state(JudgeCall::Rule), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(2, Duration::from_secs(60));
        cb.record_failure(JudgeCall::Rule);
        assert!(!cb.is_open(JudgeCall::Rule));
        cb.record_failure(JudgeCall::Rule);
        assert!(cb.is_open(JudgeCall::Rule));
    }

    #[test]
    fn test_success_resets_count() {
        let cb = breaker(2, Duration::from_secs(60));
        cb.record_failure(JudgeCall::Rule);
        cb.record_success(JudgeCall::Rule);
        cb.record_failure(JudgeCall::Rule);
        assert!(!cb.is_open(JudgeCall::Rule));
    }

    #[test]
    fn test_call_kinds_are_independent() {
        let cb = breaker(1, Duration::from_secs(60));
        cb.record_failure(JudgeCall::Precondition);
        assert!(cb.is_open(JudgeCall::Precondition));
        assert!(!cb.is_open(JudgeCall::Rule));
    }

    #[test]
    fn test_recovers_through_half_open() {
        let cb = breaker(1, Duration::ZERO);
        cb.record_failure(JudgeCall::Rule);

        assert!(!cb.is_open(JudgeCall::Rule));
        assert_eq!(cb.state(JudgeCall::Rule), CircuitState::HalfOpen { successes: 0 });

        cb.record_success(JudgeCall::Rule);
        assert_eq!(cb.state(JudgeCall::Rule), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_failed_probe_reopens() {
        let cb = breaker(1, Duration::ZERO);
        cb.record_failure(JudgeCall::Rule);
        assert!(!cb.is_open(JudgeCall::Rule));
        cb.record_failure(JudgeCall::Rule);
        assert!(matches!(cb.state(JudgeCall::Rule), CircuitState::Open { .. }));
    }
}
