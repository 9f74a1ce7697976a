//! Sliding-window usage accounting per provider, plus the concurrent
//! session counter.
//!
//! One deque of timestamped samples per provider, pruned to the widest
//! window on write; reads scan backwards and are best-effort under the
//! per-provider lock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::provider::ProviderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Minute,
    Hour,
    FiveHours,
    Day,
    Week,
    Month,
}

impl Window {
    pub fn secs(&self) -> i64 {
        match self {
            Window::Minute => 60,
            Window::Hour => 3600,
            Window::FiveHours => 5 * 3600,
            Window::Day => 24 * 3600,
            Window::Week => 7 * 24 * 3600,
            Window::Month => 30 * 24 * 3600,
        }
    }
}

const WIDEST_WINDOW_SECS: i64 = 30 * 24 * 3600;

#[derive(Debug, Clone, Copy, Default)]
pub struct UsageSample {
    pub at_unix: i64,
    pub tokens: u64,
    pub usd: f64,
}

#[derive(Debug, Default)]
struct ProviderUsage {
    samples: VecDeque<UsageSample>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowTotals {
    pub requests: u64,
    pub tokens: u64,
    pub usd: f64,
}

/// Process-wide usage state shared by the rate-limit guard and selector.
#[derive(Debug, Default)]
pub struct UsageLedger {
    usage: RwLock<HashMap<ProviderId, Arc<Mutex<ProviderUsage>>>>,
    concurrency: RwLock<HashMap<ProviderId, Arc<AtomicU32>>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn provider_usage(&self, provider_id: ProviderId) -> Arc<Mutex<ProviderUsage>> {
        if let Some(usage) = self.usage.read().expect("usage ledger lock").get(&provider_id) {
            return usage.clone();
        }
        let mut usage = self.usage.write().expect("usage ledger lock");
        usage
            .entry(provider_id)
            .or_insert_with(|| Arc::new(Mutex::new(ProviderUsage::default())))
            .clone()
    }

    fn counter(&self, provider_id: ProviderId) -> Arc<AtomicU32> {
        if let Some(counter) = self
            .concurrency
            .read()
            .expect("usage ledger lock")
            .get(&provider_id)
        {
            return counter.clone();
        }
        let mut counters = self.concurrency.write().expect("usage ledger lock");
        counters
            .entry(provider_id)
            .or_insert_with(|| Arc::new(AtomicU32::new(0)))
            .clone()
    }

    /// Record one completed request.
    pub fn record(&self, provider_id: ProviderId, sample: UsageSample) {
        let usage = self.provider_usage(provider_id);
        let mut usage = usage.lock().expect("provider usage lock");
        while let Some(front) = usage.samples.front() {
            if sample.at_unix - front.at_unix > WIDEST_WINDOW_SECS {
                usage.samples.pop_front();
            } else {
                break;
            }
        }
        usage.samples.push_back(sample);
    }

    pub fn totals(&self, provider_id: ProviderId, window: Window, now_unix: i64) -> WindowTotals {
        let cutoff = now_unix - window.secs();
        let usage = self.provider_usage(provider_id);
        let usage = usage.lock().expect("provider usage lock");
        let mut totals = WindowTotals::default();
        for sample in usage.samples.iter().rev() {
            if sample.at_unix <= cutoff {
                break;
            }
            totals.requests += 1;
            totals.tokens += sample.tokens;
            totals.usd += sample.usd;
        }
        totals
    }

    pub fn concurrent_sessions(&self, provider_id: ProviderId) -> u32 {
        self.counter(provider_id).load(Ordering::Relaxed)
    }

    /// Claim one concurrent-session slot. The permit decrements on drop, so
    /// every exit path of the dispatcher releases it.
    pub fn acquire_session(&self, provider_id: ProviderId) -> SessionPermit {
        let counter = self.counter(provider_id);
        counter.fetch_add(1, Ordering::Relaxed);
        SessionPermit { counter }
    }
}

#[derive(Debug)]
pub struct SessionPermit {
    counter: Arc<AtomicU32>,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_respect_window_cutoff() {
        let ledger = UsageLedger::new();
        let now = 100_000;
        ledger.record(1, UsageSample { at_unix: now - 3600, tokens: 50, usd: 0.5 });
        ledger.record(1, UsageSample { at_unix: now - 30, tokens: 10, usd: 0.1 });
        ledger.record(1, UsageSample { at_unix: now - 5, tokens: 20, usd: 0.2 });

        let minute = ledger.totals(1, Window::Minute, now);
        assert_eq!(minute.requests, 2);
        assert_eq!(minute.tokens, 30);

        let five_hours = ledger.totals(1, Window::FiveHours, now);
        assert_eq!(five_hours.requests, 3);
        assert!((five_hours.usd - 0.8).abs() < 1e-9);
    }

    #[test]
    fn session_permit_releases_on_drop() {
        let ledger = UsageLedger::new();
        assert_eq!(ledger.concurrent_sessions(2), 0);
        let permit = ledger.acquire_session(2);
        let second = ledger.acquire_session(2);
        assert_eq!(ledger.concurrent_sessions(2), 2);
        drop(permit);
        assert_eq!(ledger.concurrent_sessions(2), 1);
        drop(second);
        assert_eq!(ledger.concurrent_sessions(2), 0);
    }

    #[test]
    fn providers_do_not_share_windows() {
        let ledger = UsageLedger::new();
        ledger.record(1, UsageSample { at_unix: 10, tokens: 5, usd: 0.0 });
        assert_eq!(ledger.totals(2, Window::Month, 20).requests, 0);
    }
}
