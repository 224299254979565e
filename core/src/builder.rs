//! Builder API for ergonomic circuit breaker configuration

use crate::{
    State,
    callbacks::Callbacks,
    circuit::{CircuitBreaker, Config, FallbackContext, FallbackFn},
    clock::{Clock, MonotonicClock},
    errors::ConfigError,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
pub struct CircuitBuilder<T, E> {
    name: String,
    config: Config,
    fallback: Option<FallbackFn<T, E>>,
    callbacks: Callbacks,
    clock: Option<Arc<dyn Clock>>,
}

impl<T, E> CircuitBuilder<T, E> {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            fallback: None,
            callbacks: Callbacks::new(),
            clock: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the failure threshold (the circuit opens once failures exceed it)
    pub fn failure_threshold(mut self, threshold: usize) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set the cooldown spent Open before a trial call
    pub fn try_again_timeout(mut self, timeout: Duration) -> Self {
        self.config.try_again_timeout = timeout;
        self
    }

    /// Set the per-call timeout. Recorded in the config, not enforced.
    pub fn execute_timeout(mut self, timeout: Duration) -> Self {
        self.config.execute_timeout = timeout;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Set the time source used for cooldown deadlines
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the fallback invoked while the circuit is open (required)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lazy_breaker::{CircuitBreaker, ConfigError};
    ///
    /// let missing = CircuitBreaker::<String, String>::builder("profile").build();
    /// assert!(matches!(missing, Err(ConfigError::MissingFallback { .. })));
    ///
    /// let circuit = CircuitBreaker::builder("profile")
    ///     .fallback(|ctx| Ok::<_, String>(format!("{} unavailable", ctx.circuit_name)))
    ///     .build();
    /// assert!(circuit.is_ok());
    /// ```
    pub fn fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(&FallbackContext) -> Result<T, E> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(f));
        self
    }

    /// Set the notifier called on every observed state change
    ///
    /// Replaces the default notifier, which logs through `tracing`.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, State) + Send + Sync + 'static,
    {
        self.callbacks.on_state_change = Arc::new(f);
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Build the circuit breaker
    pub fn build(self) -> Result<CircuitBreaker<T, E>, ConfigError> {
        let factor = self.config.jitter_factor;
        if !(0.0..=1.0).contains(&factor) {
            return Err(ConfigError::InvalidJitter { factor });
        }

        let fallback = self.fallback.ok_or_else(|| ConfigError::MissingFallback {
            circuit: self.name.clone(),
        })?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock));

        Ok(CircuitBreaker::from_parts(
            self.name,
            self.config,
            fallback,
            self.callbacks,
            clock,
        ))
    }
}

impl<T, E> std::fmt::Debug for CircuitBuilder<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBuilder")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("fallback", &self.fallback.is_some())
            .field("callbacks", &self.callbacks)
            .field("clock", &self.clock)
            .finish()
    }
}
