//! Per-provider circuit breaker: three states, a monotonic failure
//! counter, and an automatic OPEN -> HALF_OPEN transition once the
//! cooldown has elapsed.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// A single provider's breaker. `state()` is computed, not stored: an
/// OPEN breaker whose cooldown has elapsed reports HALF_OPEN without any
/// external tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub cooldown_seconds: i64,
    pub last_failure: Option<DateTime<Utc>>,
    tripped: bool,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, 60)
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown_seconds: i64) -> Self {
        Self {
            failure_count: 0,
            failure_threshold,
            cooldown_seconds,
            last_failure: None,
            tripped: false,
        }
    }

    /// Current state, recomputed from the stored timestamp.
    pub fn state(&self) -> BreakerState {
        if !self.tripped {
            return BreakerState::Closed;
        }
        match self.last_failure {
            Some(last) => {
                let elapsed = Utc::now().signed_duration_since(last).num_seconds();
                if elapsed >= self.cooldown_seconds {
                    BreakerState::HalfOpen
                } else {
                    BreakerState::Open
                }
            }
            None => BreakerState::Open,
        }
    }

    /// CLOSED and HALF_OPEN admit traffic; only a still-cooling OPEN
    /// breaker refuses.
    pub fn allow(&self) -> bool {
        !matches!(self.state(), BreakerState::Open)
    }

    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.tripped = false;
        self.last_failure = None;
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure = Some(Utc::now());
        if self.failure_count >= self.failure_threshold {
            self.tripped = true;
        }
    }
}

/// Process-wide breaker table, one entry per provider, guarded by a
/// single reader-writer lock so breaker transitions never race a
/// concurrent `allow()`.
#[derive(Default)]
pub struct BreakerTable {
    breakers: RwLock<HashMap<String, CircuitBreaker>>,
    failure_threshold: u32,
    cooldown_seconds: i64,
}

impl BreakerTable {
    pub fn new(failure_threshold: u32, cooldown_seconds: i64) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            failure_threshold,
            cooldown_seconds,
        }
    }

    pub fn allow(&self, provider: &str) -> bool {
        self.breakers
            .read()
            .expect("breaker lock poisoned")
            .get(provider)
            .map(CircuitBreaker::allow)
            .unwrap_or(true)
    }

    pub fn record_success(&self, provider: &str) {
        let mut table = self.breakers.write().expect("breaker lock poisoned");
        table
            .entry(provider.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.failure_threshold, self.cooldown_seconds))
            .record_success();
    }

    pub fn record_failure(&self, provider: &str) {
        let mut table = self.breakers.write().expect("breaker lock poisoned");
        table
            .entry(provider.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.failure_threshold, self.cooldown_seconds))
            .record_failure();
    }

    pub fn failure_count(&self, provider: &str) -> u32 {
        self.breakers
            .read()
            .expect("breaker lock poisoned")
            .get(provider)
            .map(|b| b.failure_count)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_by_default_and_allows() {
        let breaker = CircuitBreaker::default();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow());
    }

    #[test]
    fn trips_open_at_threshold() {
        let mut breaker = CircuitBreaker::new(3, 60);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn success_resets_counter_and_closes() {
        let mut breaker = CircuitBreaker::new(3, 60);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.failure_count, 0);
    }

    #[test]
    fn transitions_to_half_open_after_cooldown() {
        let mut breaker = CircuitBreaker::new(1, 0);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.allow());
    }

    #[test]
    fn table_allows_unknown_providers_by_default() {
        let table = BreakerTable::new(5, 60);
        assert!(table.allow("aws"));
    }

    #[test]
    fn table_tracks_failures_per_provider() {
        let table = BreakerTable::new(2, 60);
        table.record_failure("oci");
        table.record_failure("oci");
        assert!(!table.allow("oci"));
        assert!(table.allow("aws"));
    }
}
