//! Circuit breaker implementation with lazily derived state
//!
//! The state is never stored. Every call derives it from the cumulative
//! failure count and the retry deadline, then records its own outcome.

use crate::{
    State,
    callbacks::Callbacks,
    clock::{Clock, MonotonicClock},
    errors::{BoxError, CircuitError},
};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Failures tolerated before the circuit opens (it opens on the next one)
pub const DEFAULT_FAILURE_THRESHOLD: usize = 10;

/// Reserved per-call timeout
pub const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_millis(500);

/// Cooldown before a trial call, ten times the execute timeout
pub const DEFAULT_TRY_AGAIN_TIMEOUT: Duration = Duration::from_millis(500 * 10);

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// The circuit opens once cumulative failures exceed this value
    pub failure_threshold: usize,

    /// Time spent Open before one trial call is let through
    pub try_again_timeout: Duration,

    /// Intended bound for a single call. Not enforced.
    pub execute_timeout: Duration,

    /// Jitter factor for try_again_timeout (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            try_again_timeout: DEFAULT_TRY_AGAIN_TIMEOUT,
            execute_timeout: DEFAULT_EXECUTE_TIMEOUT,
            jitter_factor: 0.0,
        }
    }
}

/// Context provided to fallback closures when circuit is open
#[derive(Debug, Clone)]
pub struct FallbackContext {
    /// Circuit name
    pub circuit_name: String,
    /// Cumulative failures at the time of the call
    pub failures: usize,
    /// Time left until the next trial call, if a cooldown is pending
    pub retry_in: Option<Duration>,
}

/// Fallback invoked in place of the protected call while the circuit is open
pub type FallbackFn<T, E> = Arc<dyn Fn(&FallbackContext) -> Result<T, E> + Send + Sync>;

/// One-shot fallback supplied for a single call
pub type CallFallbackFn<'a, T, E> = Box<dyn FnOnce(&FallbackContext) -> Result<T, E> + 'a>;

/// Options for a single circuit breaker call
pub struct CallOptions<'a, T, E> {
    fallback: Option<CallFallbackFn<'a, T, E>>,
    reject_when_open: bool,
}

impl<T, E> Default for CallOptions<'_, T, E> {
    fn default() -> Self {
        Self {
            fallback: None,
            reject_when_open: false,
        }
    }
}

impl<'a, T, E> CallOptions<'a, T, E> {
    /// Use the configured fallback
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configured fallback for this call
    pub fn with_fallback<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&FallbackContext) -> Result<T, E> + 'a,
    {
        self.fallback = Some(Box::new(f));
        self.reject_when_open = false;
        self
    }

    /// Skip any fallback and return [`CircuitError::Open`] while open
    pub fn reject() -> Self {
        Self {
            fallback: None,
            reject_when_open: true,
        }
    }
}

/// Point-in-time view of the runtime counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub failures: usize,
    pub last_state: State,
    pub cooldown_pending: bool,
}

/// Mutable runtime data, only touched under the breaker's lock
#[derive(Debug, Default)]
struct BreakerState {
    failures: usize,
    last_state: State,
    retry_deadline: Option<Instant>,
}

/// Outcome of the admission step at the top of a call
struct Admission {
    state: State,
    transition: Option<State>,
    /// Present only when the call is routed to the fallback
    fallback_context: Option<FallbackContext>,
}

/// Circuit breaker public API
///
/// `T` and `E` are the success and error types shared by the protected
/// calls and the fallback.
pub struct CircuitBreaker<T = (), E = BoxError> {
    name: String,
    config: Config,
    fallback: FallbackFn<T, E>,
    callbacks: Callbacks,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl<T, E> CircuitBreaker<T, E> {
    /// Create a new circuit breaker (use builder() for more options)
    pub fn new<F>(name: impl Into<String>, config: Config, fallback: F) -> Self
    where
        F: Fn(&FallbackContext) -> Result<T, E> + Send + Sync + 'static,
    {
        Self::from_parts(
            name.into(),
            config,
            Arc::new(fallback),
            Callbacks::new(),
            Arc::new(MonotonicClock),
        )
    }

    /// Assemble a circuit breaker from validated parts (used by builder)
    pub(crate) fn from_parts(
        name: String,
        config: Config,
        fallback: FallbackFn<T, E>,
        callbacks: Callbacks,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name,
            config,
            fallback,
            callbacks,
            clock,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder<T, E> {
        crate::builder::CircuitBuilder::new(name)
    }

    /// Execute a fallible operation with circuit breaker protection
    ///
    /// While Closed or HalfOpen the operation runs; an `Err` or a panic counts
    /// as one failure. While Open the configured fallback runs instead and its
    /// outcome is returned, with a fallback error wrapped in
    /// [`CircuitError::Fallback`].
    pub fn execute<F>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.execute_with(f, CallOptions::default())
    }

    /// Execute with per-call options
    ///
    /// ```rust
    /// use lazy_breaker::{CallOptions, CircuitBreaker, CircuitError, Config};
    ///
    /// let circuit = CircuitBreaker::new(
    ///     "quotes",
    ///     Config { failure_threshold: 0, ..Default::default() },
    ///     |_ctx| Ok::<_, String>(0.0),
    /// );
    /// let _ = circuit.execute(|| Err::<f64, _>("down".to_string()));
    ///
    /// let result = circuit.execute_with(|| Ok(1.5), CallOptions::reject());
    /// assert!(matches!(result, Err(CircuitError::Open { .. })));
    /// ```
    pub fn execute_with<F>(
        &self,
        f: F,
        options: CallOptions<'_, T, E>,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let admission = self.admit();
        if let Some(state) = admission.transition {
            self.callbacks.trigger(&self.name, state);
        }

        match admission.fallback_context {
            Some(ctx) => self.run_fallback(&ctx, options),
            None => self.run_protected(f, admission.state),
        }
    }

    /// Derive the state, detect a transition and start the cooldown, atomically
    fn admit(&self) -> Admission {
        let mut guard = self.state.lock();
        let now = self.clock.now();
        let state = self.derive(&mut guard, now);

        tracing::debug!(
            circuit = %self.name,
            state = %state,
            failures = guard.failures,
            "evaluated circuit state"
        );

        let mut transition = None;
        if state != guard.last_state {
            transition = Some(state);
            if state == State::Open {
                self.start_retry_timer(&mut guard, now);
            }
        }
        guard.last_state = state;

        let fallback_context = (state == State::Open).then(|| FallbackContext {
            circuit_name: self.name.clone(),
            failures: guard.failures,
            retry_in: guard
                .retry_deadline
                .map(|deadline| deadline.saturating_duration_since(now)),
        });

        Admission {
            state,
            transition,
            fallback_context,
        }
    }

    /// Failed circuits report HalfOpen once per expired deadline, consuming it
    fn derive(&self, state: &mut BreakerState, now: Instant) -> State {
        if state.failures <= self.config.failure_threshold {
            // A deadline left behind by an earlier cooldown must not survive into the next one
            state.retry_deadline = None;
            return State::Closed;
        }

        match state.retry_deadline {
            Some(deadline) if now >= deadline => {
                state.retry_deadline = None;
                State::HalfOpen
            }
            _ => State::Open,
        }
    }

    /// A cooldown too long to represent as an `Instant` leaves no deadline,
    /// so the circuit stays Open until `reset()`
    fn start_retry_timer(&self, state: &mut BreakerState, now: Instant) {
        let cooldown = self.cooldown();
        state.retry_deadline = now.checked_add(cooldown);

        match state.retry_deadline {
            Some(_) => tracing::debug!(
                circuit = %self.name,
                cooldown_ms = u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX),
                "starting retry timer"
            ),
            None => tracing::warn!(
                circuit = %self.name,
                "cooldown overflows the clock, circuit stays open until reset"
            ),
        }
    }

    /// Cooldown length, jittered with chrono-machines when configured
    ///
    /// chrono-machines works in whole milliseconds, so the jitter is applied
    /// as a ratio to the full timeout to keep sub-millisecond precision.
    fn cooldown(&self) -> Duration {
        let timeout = self.config.try_again_timeout;
        let base_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if self.config.jitter_factor <= 0.0 || base_ms == 0 {
            return timeout;
        }

        let policy = chrono_machines::Policy {
            max_attempts: 1,
            base_delay_ms: base_ms,
            multiplier: 1.0,
            max_delay_ms: base_ms,
        };
        let delay_ms = policy.calculate_delay(1, self.config.jitter_factor);
        let ratio = (delay_ms as f64 / base_ms as f64).clamp(0.0, 1.0);
        timeout.mul_f64(ratio)
    }

    fn run_protected<F>(&self, f: F, trial: State) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let result = match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CircuitError::Execution(e)),
            Err(payload) => Err(self.recover_fault(&*payload, "protected call")),
        };

        self.record_outcome(trial, result.is_ok());
        result
    }

    fn run_fallback(
        &self,
        ctx: &FallbackContext,
        options: CallOptions<'_, T, E>,
    ) -> Result<T, CircuitError<E>> {
        if options.reject_when_open {
            return Err(CircuitError::Open {
                circuit: self.name.clone(),
            });
        }

        let outcome = match options.fallback {
            Some(fallback) => panic::catch_unwind(AssertUnwindSafe(|| fallback(ctx))),
            None => panic::catch_unwind(AssertUnwindSafe(|| (self.fallback)(ctx))),
        };

        // Fallback outcomes never touch the failure count
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CircuitError::Fallback(e)),
            Err(payload) => Err(self.recover_fault(&*payload, "fallback")),
        }
    }

    fn record_outcome(&self, trial: State, succeeded: bool) {
        let mut guard = self.state.lock();

        if !succeeded {
            guard.failures = guard.failures.saturating_add(1);
        }

        if trial == State::HalfOpen {
            if succeeded {
                // A caller that saw Open during the trial may have restarted the cooldown
                guard.failures = 0;
                guard.retry_deadline = None;
            } else {
                let now = self.clock.now();
                self.start_retry_timer(&mut guard, now);
            }
        }
    }

    fn recover_fault(&self, payload: &(dyn Any + Send), origin: &str) -> CircuitError<E> {
        let message = panic_message(payload);
        tracing::error!(circuit = %self.name, origin, %message, "recovered panic");
        CircuitError::Fault {
            circuit: self.name.clone(),
            message,
        }
    }

    /// Circuit name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn snapshot(&self) -> Snapshot {
        let guard = self.state.lock();
        Snapshot {
            failures: guard.failures,
            last_state: guard.last_state,
            cooldown_pending: guard.retry_deadline.is_some(),
        }
    }

    /// Cumulative failure count
    pub fn failures(&self) -> usize {
        self.state.lock().failures
    }

    /// State observed by the most recent call
    pub fn last_state(&self) -> State {
        self.state.lock().last_state
    }

    /// State the next call would observe, without consuming the retry deadline
    pub fn state(&self) -> State {
        let guard = self.state.lock();
        if guard.failures <= self.config.failure_threshold {
            return State::Closed;
        }
        match guard.retry_deadline {
            Some(deadline) if self.clock.now() >= deadline => State::HalfOpen,
            _ => State::Open,
        }
    }

    /// Check if circuit is open
    pub fn is_open(&self) -> bool {
        self.state() == State::Open
    }

    /// Check if circuit is closed
    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    /// Get current state name
    pub fn state_name(&self) -> &'static str {
        self.state().as_str()
    }

    /// Clear failures and any pending cooldown, returning to Closed
    pub fn reset(&self) {
        let previous = {
            let mut guard = self.state.lock();
            guard.failures = 0;
            guard.retry_deadline = None;
            std::mem::replace(&mut guard.last_state, State::Closed)
        };

        if previous != State::Closed {
            self.callbacks.trigger(&self.name, State::Closed);
        }
    }
}

impl<T, E> std::fmt::Debug for CircuitBreaker<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .field("clock", &self.clock)
            .field("state", &*self.state.lock())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
