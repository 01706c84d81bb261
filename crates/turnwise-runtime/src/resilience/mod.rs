//! Resilience around judge calls.
//!
//! - Circuit breaker per judge call kind
//! - Retry with exponential backoff
//! - Fallback when the judge cannot answer
//! - Token usage accounting

mod circuit_breaker;
mod fallback;
mod retry;
mod usage;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use fallback::{FallbackStrategy, JudgeFailurePolicy};
pub use retry::RetryPolicy;
pub use usage::{LlmUsage, UsageTracker};
