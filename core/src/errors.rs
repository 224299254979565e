//! Error types for circuit breaker operations

use thiserror::Error;

/// Boxed error used as the default protected-call error type
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned from [`CircuitBreaker::execute`](crate::CircuitBreaker::execute)
#[derive(Debug, Error)]
pub enum CircuitError<E = BoxError> {
    /// Circuit is open and the call opted out of the fallback
    #[error("circuit '{circuit}' is open")]
    Open { circuit: String },

    /// A panic was recovered; `message` carries the panic payload when it was a string
    #[error("fault recovered in circuit '{circuit}': {message}")]
    Fault { circuit: String, message: String },

    /// The protected operation failed
    #[error("circuit execution failed: {0}")]
    Execution(#[source] E),

    /// Circuit is open and the fallback failed as well
    #[error("circuit fallback failed: {0}")]
    Fallback(#[source] E),
}

impl<E> CircuitError<E> {
    /// True when the protected operation was skipped because the circuit was open
    pub fn is_open_path(&self) -> bool {
        matches!(self, CircuitError::Open { .. } | CircuitError::Fallback(_))
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, CircuitError::Fault { .. })
    }

    /// Unwrap the error produced by the protected call or the fallback
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) | CircuitError::Fallback(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors raised while building a circuit breaker
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("circuit '{circuit}' has no fallback configured")]
    MissingFallback { circuit: String },

    #[error("jitter factor {factor} is outside 0.0..=1.0")]
    InvalidJitter { factor: f64 },
}
