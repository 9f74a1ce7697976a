//! Per-provider circuit breaker.
//!
//! Any upstream non-2xx (4xx included) or network error counts as a
//! failure, so a provider with a revoked key or exhausted account quota
//! rotates off the pool quickly. Time is passed in as unix seconds to keep
//! the state machine testable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::provider::ProviderId;

pub const FAILURE_THRESHOLD: u32 = 5;
const BASE_BACKOFF_SECS: i64 = 60;
const MAX_BACKOFF_SECS: i64 = 30 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::HalfOpen => "half_open",
            CircuitState::Open => "open",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub open_until_unix: Option<i64>,
}

#[derive(Debug, Default)]
struct CircuitEntry {
    failure_count: u32,
    last_failure_unix: i64,
    open_until_unix: Option<i64>,
    probe_in_flight: bool,
}

impl CircuitEntry {
    fn state(&self, now_unix: i64) -> CircuitState {
        match self.open_until_unix {
            Some(until) if now_unix < until => CircuitState::Open,
            Some(_) => CircuitState::HalfOpen,
            None => CircuitState::Closed,
        }
    }
}

/// Admission decision for one attempt.
#[derive(Debug)]
pub enum Admission {
    /// Circuit closed; go ahead.
    Allowed,
    /// Circuit half-open; this attempt is the single probe. The guard
    /// releases the probe slot if dropped without a recorded outcome.
    Probe(ProbeGuard),
    /// Circuit open (or a probe is already in flight).
    Denied { open_until_unix: Option<i64> },
}

#[derive(Debug)]
pub struct ProbeGuard {
    entry: Arc<Mutex<CircuitEntry>>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        if let Ok(mut entry) = self.entry.lock() {
            entry.probe_in_flight = false;
        }
    }
}

/// Process-wide circuit state keyed by provider id, with per-key locking.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    entries: RwLock<HashMap<ProviderId, Arc<Mutex<CircuitEntry>>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, provider_id: ProviderId) -> Arc<Mutex<CircuitEntry>> {
        if let Some(entry) = self.entries.read().expect("circuit registry lock").get(&provider_id) {
            return entry.clone();
        }
        let mut entries = self.entries.write().expect("circuit registry lock");
        entries
            .entry(provider_id)
            .or_insert_with(|| Arc::new(Mutex::new(CircuitEntry::default())))
            .clone()
    }

    pub fn state(&self, provider_id: ProviderId, now_unix: i64) -> CircuitState {
        self.snapshot(provider_id, now_unix).state
    }

    pub fn snapshot(&self, provider_id: ProviderId, now_unix: i64) -> CircuitSnapshot {
        let entry = self.entry(provider_id);
        let entry = entry.lock().expect("circuit entry lock");
        CircuitSnapshot {
            state: entry.state(now_unix),
            failure_count: entry.failure_count,
            open_until_unix: entry.open_until_unix,
        }
    }

    pub fn open_until(&self, provider_id: ProviderId) -> Option<i64> {
        let entry = self.entry(provider_id);
        let entry = entry.lock().expect("circuit entry lock");
        entry.open_until_unix
    }

    /// Admission check for one attempt. Half-open admits exactly one probe
    /// at a time; concurrent probers are denied until the slot frees.
    pub fn admit(&self, provider_id: ProviderId, now_unix: i64) -> Admission {
        let entry = self.entry(provider_id);
        let mut guard = entry.lock().expect("circuit entry lock");
        match guard.state(now_unix) {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => Admission::Denied {
                open_until_unix: guard.open_until_unix,
            },
            CircuitState::HalfOpen => {
                if guard.probe_in_flight {
                    return Admission::Denied {
                        open_until_unix: guard.open_until_unix,
                    };
                }
                guard.probe_in_flight = true;
                drop(guard);
                Admission::Probe(ProbeGuard { entry })
            }
        }
    }

    pub fn record_success(&self, provider_id: ProviderId) {
        let entry = self.entry(provider_id);
        let mut entry = entry.lock().expect("circuit entry lock");
        entry.failure_count = 0;
        entry.open_until_unix = None;
        entry.probe_in_flight = false;
    }

    pub fn record_failure(&self, provider_id: ProviderId, now_unix: i64) -> CircuitSnapshot {
        let entry = self.entry(provider_id);
        let mut entry = entry.lock().expect("circuit entry lock");
        entry.failure_count = entry.failure_count.saturating_add(1);
        entry.last_failure_unix = now_unix;
        entry.probe_in_flight = false;
        if entry.failure_count >= FAILURE_THRESHOLD {
            entry.open_until_unix = Some(now_unix + backoff_secs(entry.failure_count));
        }
        CircuitSnapshot {
            state: entry.state(now_unix),
            failure_count: entry.failure_count,
            open_until_unix: entry.open_until_unix,
        }
    }
}

/// Capped exponential: `min(base * 2^(failures - threshold), max)`.
fn backoff_secs(failure_count: u32) -> i64 {
    let exponent = failure_count.saturating_sub(FAILURE_THRESHOLD).min(32);
    BASE_BACKOFF_SECS
        .saturating_mul(1i64 << exponent)
        .min(MAX_BACKOFF_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let registry = CircuitBreakerRegistry::new();
        let now = 1_000;
        for _ in 0..FAILURE_THRESHOLD - 1 {
            registry.record_failure(7, now);
        }
        assert_eq!(registry.state(7, now), CircuitState::Closed);
        let snapshot = registry.record_failure(7, now);
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.open_until_unix, Some(now + BASE_BACKOFF_SECS));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_secs(FAILURE_THRESHOLD), 60);
        assert_eq!(backoff_secs(FAILURE_THRESHOLD + 1), 120);
        assert_eq!(backoff_secs(FAILURE_THRESHOLD + 4), 960);
        assert_eq!(backoff_secs(FAILURE_THRESHOLD + 10), MAX_BACKOFF_SECS);
        assert_eq!(backoff_secs(60), MAX_BACKOFF_SECS);
    }

    #[test]
    fn open_transitions_to_half_open_after_deadline() {
        let registry = CircuitBreakerRegistry::new();
        let now = 1_000;
        for _ in 0..FAILURE_THRESHOLD {
            registry.record_failure(1, now);
        }
        assert_eq!(registry.state(1, now + 1), CircuitState::Open);
        assert_eq!(
            registry.state(1, now + BASE_BACKOFF_SECS),
            CircuitState::HalfOpen
        );
    }

    #[test]
    fn half_open_admits_a_single_probe() {
        let registry = CircuitBreakerRegistry::new();
        let now = 1_000;
        for _ in 0..FAILURE_THRESHOLD {
            registry.record_failure(1, now);
        }
        let later = now + BASE_BACKOFF_SECS;

        let first = registry.admit(1, later);
        assert!(matches!(first, Admission::Probe(_)));
        assert!(matches!(registry.admit(1, later), Admission::Denied { .. }));

        // Dropping the guard without an outcome frees the slot.
        drop(first);
        assert!(matches!(registry.admit(1, later), Admission::Probe(_)));
    }

    #[test]
    fn probe_success_closes_and_probe_failure_reopens_longer() {
        let registry = CircuitBreakerRegistry::new();
        let now = 1_000;
        for _ in 0..FAILURE_THRESHOLD {
            registry.record_failure(1, now);
        }
        let later = now + BASE_BACKOFF_SECS;

        let Admission::Probe(_guard) = registry.admit(1, later) else {
            panic!("expected probe admission");
        };
        let snapshot = registry.record_failure(1, later);
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(
            snapshot.open_until_unix,
            Some(later + 2 * BASE_BACKOFF_SECS)
        );

        let much_later = later + 2 * BASE_BACKOFF_SECS;
        let Admission::Probe(_guard) = registry.admit(1, much_later) else {
            panic!("expected probe admission");
        };
        registry.record_success(1);
        assert_eq!(registry.state(1, much_later), CircuitState::Closed);
        assert!(matches!(registry.admit(1, much_later), Admission::Allowed));
    }

    #[test]
    fn success_in_closed_resets_failure_count() {
        let registry = CircuitBreakerRegistry::new();
        registry.record_failure(1, 10);
        registry.record_failure(1, 11);
        registry.record_success(1);
        assert_eq!(registry.snapshot(1, 12).failure_count, 0);
    }
}
