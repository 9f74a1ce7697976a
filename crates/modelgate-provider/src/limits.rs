//! Rate-limit guard over the usage ledger: tpm/rpm/rpd windows, rolling
//! USD budgets, and the concurrency ceiling.

use std::sync::Arc;

use crate::provider::Provider;
use crate::usage::{UsageLedger, Window};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LimitExceeded {
    #[error("tokens-per-minute ceiling reached ({used}/{limit})")]
    Tpm { used: u64, limit: u64 },
    #[error("requests-per-minute ceiling reached ({used}/{limit})")]
    Rpm { used: u64, limit: u64 },
    #[error("requests-per-day ceiling reached ({used}/{limit})")]
    Rpd { used: u64, limit: u64 },
    #[error("{window} USD budget exhausted ({spent:.4}/{limit:.4})")]
    Budget {
        window: &'static str,
        spent: f64,
        limit: f64,
    },
    #[error("concurrent session ceiling reached ({active}/{limit})")]
    Concurrency { active: u32, limit: u32 },
}

#[derive(Debug, Clone)]
pub struct RateLimitGuard {
    ledger: Arc<UsageLedger>,
}

impl RateLimitGuard {
    pub fn new(ledger: Arc<UsageLedger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    /// Check every active ceiling for this provider. `Ok` means one more
    /// request may be admitted right now.
    pub fn check(&self, provider: &Provider, now_unix: i64) -> Result<(), LimitExceeded> {
        if let Some(limit) = provider.concurrency_limit() {
            let active = self.ledger.concurrent_sessions(provider.id);
            if active >= limit {
                return Err(LimitExceeded::Concurrency { active, limit });
            }
        }

        if provider.tpm.is_some() || provider.rpm.is_some() {
            let minute = self.ledger.totals(provider.id, Window::Minute, now_unix);
            if let Some(limit) = provider.tpm
                && minute.tokens >= limit
            {
                return Err(LimitExceeded::Tpm {
                    used: minute.tokens,
                    limit,
                });
            }
            if let Some(limit) = provider.rpm
                && minute.requests >= limit
            {
                return Err(LimitExceeded::Rpm {
                    used: minute.requests,
                    limit,
                });
            }
        }

        if let Some(limit) = provider.rpd {
            let day = self.ledger.totals(provider.id, Window::Day, now_unix);
            if day.requests >= limit {
                return Err(LimitExceeded::Rpd {
                    used: day.requests,
                    limit,
                });
            }
        }

        for (window, name, limit) in [
            (Window::FiveHours, "5h", provider.limit_5h_usd),
            (Window::Week, "weekly", provider.limit_weekly_usd),
            (Window::Month, "monthly", provider.limit_monthly_usd),
        ] {
            if let Some(limit) = limit {
                let spent = self.ledger.totals(provider.id, window, now_unix).usd;
                if spent >= limit {
                    return Err(LimitExceeded::Budget {
                        window: name,
                        spent,
                        limit,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::UsageSample;

    fn provider() -> Provider {
        serde_json::from_value(serde_json::json!({
            "id": 1, "name": "a", "base_url": "https://x", "api_key": "k",
            "kind": "openai-compatible"
        }))
        .unwrap()
    }

    #[test]
    fn rpm_ceiling_rejects_at_limit() {
        let ledger = Arc::new(UsageLedger::new());
        let guard = RateLimitGuard::new(ledger.clone());
        let mut provider = provider();
        provider.rpm = Some(2);

        let now = 10_000;
        assert!(guard.check(&provider, now).is_ok());
        ledger.record(1, UsageSample { at_unix: now - 10, tokens: 1, usd: 0.0 });
        ledger.record(1, UsageSample { at_unix: now - 5, tokens: 1, usd: 0.0 });
        assert!(matches!(
            guard.check(&provider, now),
            Err(LimitExceeded::Rpm { used: 2, limit: 2 })
        ));
    }

    #[test]
    fn budget_windows_reject_when_spent() {
        let ledger = Arc::new(UsageLedger::new());
        let guard = RateLimitGuard::new(ledger.clone());
        let mut provider = provider();
        provider.limit_5h_usd = Some(1.0);

        let now = 50_000;
        ledger.record(1, UsageSample { at_unix: now - 60, tokens: 0, usd: 1.25 });
        assert!(matches!(
            guard.check(&provider, now),
            Err(LimitExceeded::Budget { window: "5h", .. })
        ));
    }

    #[test]
    fn concurrency_ceiling_counts_live_permits() {
        let ledger = Arc::new(UsageLedger::new());
        let guard = RateLimitGuard::new(ledger.clone());
        let mut provider = provider();
        provider.cc = Some(1);

        let permit = ledger.acquire_session(1);
        assert!(matches!(
            guard.check(&provider, 0),
            Err(LimitExceeded::Concurrency { active: 1, limit: 1 })
        ));
        drop(permit);
        assert!(guard.check(&provider, 0).is_ok());
    }
}
