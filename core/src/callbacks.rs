//! Callback system for circuit breaker state transitions

use crate::State;
use std::sync::Arc;

/// Notifier invoked with the circuit name and the newly observed state
pub type StateChangeFn = Arc<dyn Fn(&str, State) + Send + Sync>;

/// Hook invoked with the circuit name
pub type HookFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Default notifier: logs every observed transition through `tracing`
pub fn log_state_change(circuit: &str, state: State) {
    match state {
        State::Open => tracing::warn!(circuit, state = %state, "circuit state changed"),
        State::HalfOpen | State::Closed => {
            tracing::info!(circuit, state = %state, "circuit state changed")
        }
    }
}

/// Callbacks for circuit breaker events
#[derive(Clone)]
pub struct Callbacks {
    pub on_state_change: StateChangeFn,
    pub on_open: Option<HookFn>,
    pub on_close: Option<HookFn>,
    pub on_half_open: Option<HookFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self {
            on_state_change: Arc::new(log_state_change),
            on_open: None,
            on_close: None,
            on_half_open: None,
        }
    }

    /// Fire the notifier, then the hook registered for `state`
    pub fn trigger(&self, circuit: &str, state: State) {
        (self.on_state_change)(circuit, state);

        let hook = match state {
            State::Open => &self.on_open,
            State::HalfOpen => &self.on_half_open,
            State::Closed => &self.on_close,
        };
        if let Some(callback) = hook {
            callback(circuit);
        }
    }
}

impl Default for Callbacks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_state_change", &"<fn>")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}
