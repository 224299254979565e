//! LazyBreaker - circuit breaker with a pull-based cooldown
//!
//! This crate guards calls to an unreliable operation:
//! - Cumulative failure counting against a fixed threshold
//! - State derived on every call from the failure count and a retry deadline
//! - Mandatory fallback path while the circuit is open
//! - Panics in the protected call are contained and counted as failures
//! - No background task: cooldown expiry is noticed by the next call
//!
//! # Example
//!
//! ```rust
//! use lazy_breaker::{CircuitBreaker, State};
//! use std::time::Duration;
//!
//! let circuit = CircuitBreaker::builder("inventory_api")
//!     .failure_threshold(2)
//!     .try_again_timeout(Duration::from_millis(200))
//!     .fallback(|_ctx| Ok::<_, String>("cached inventory".to_string()))
//!     .on_state_change(|name, state| println!("circuit {} is now {}", name, state))
//!     .build()
//!     .expect("fallback is configured");
//!
//! // Closed: the protected call runs
//! let result = circuit.execute(|| Ok::<_, String>("live inventory".to_string()));
//! assert_eq!(result.unwrap(), "live inventory");
//!
//! // Three failures exceed the threshold of two
//! for _ in 0..3 {
//!     let _ = circuit.execute(|| Err::<String, _>("timeout".to_string()));
//! }
//!
//! // The next call observes Open and is routed to the fallback
//! let result = circuit.execute(|| Ok::<_, String>("not called".to_string()));
//! assert_eq!(result.unwrap(), "cached inventory");
//! assert_eq!(circuit.last_state(), State::Open);
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod clock;
pub mod errors;

pub use builder::CircuitBuilder;
pub use callbacks::{Callbacks, log_state_change};
pub use circuit::{
    CallOptions, CircuitBreaker, Config, DEFAULT_EXECUTE_TIMEOUT, DEFAULT_FAILURE_THRESHOLD,
    DEFAULT_TRY_AGAIN_TIMEOUT, FallbackContext, FallbackFn, Snapshot,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use errors::{BoxError, CircuitError, ConfigError};

use std::fmt;

/// Circuit state as derived at the start of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// Normal operation, calls reach the protected function
    #[default]
    Closed,
    /// Failing, calls are routed to the fallback
    Open,
    /// Cooldown elapsed, one trial call reaches the protected function
    HalfOpen,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "Closed",
            State::Open => "Open",
            State::HalfOpen => "HalfOpen",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
