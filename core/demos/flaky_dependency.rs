//! A flaky third-party call guarded by a circuit breaker
//!
//! Run with `RUST_LOG=debug cargo run --example flaky_dependency` to see
//! every state evaluation.

use lazy_breaker::{CircuitBreaker, CircuitError};
use std::cell::Cell;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Whoopsie;

impl std::fmt::Display for Whoopsie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("whoopsie")
    }
}

impl std::error::Error for Whoopsie {}

/// Fails on every third call, otherwise answers slowly
fn nasty_third_party_code(attempt: usize) -> Result<String, Whoopsie> {
    tracing::info!(attempt, "calling nasty third party code");
    if attempt % 3 == 0 {
        return Err(Whoopsie);
    }
    std::thread::sleep(Duration::from_millis(30));
    Ok(format!("answer #{}", attempt))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let circuit = CircuitBreaker::builder("third_party")
        .failure_threshold(3)
        .try_again_timeout(Duration::from_millis(200))
        .fallback(|ctx| {
            tracing::info!(failures = ctx.failures, "falling back to cached answer");
            std::thread::sleep(Duration::from_millis(30));
            Ok("cached answer".to_string())
        })
        .build()
        .expect("fallback is configured");

    let attempt = Cell::new(0);
    for _ in 0..40 {
        let result = circuit.execute(|| {
            let n = attempt.get();
            attempt.set(n + 1);
            nasty_third_party_code(n)
        });

        match result {
            Ok(answer) => println!("[{:>8}] {}", circuit.last_state(), answer),
            Err(CircuitError::Execution(e)) => {
                println!("[{:>8}] error: {}", circuit.last_state(), e)
            }
            Err(e) => println!("[{:>8}] {}", circuit.last_state(), e),
        }
    }

    println!("final snapshot: {:?}", circuit.snapshot());
}
