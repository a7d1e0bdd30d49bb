//! Access governor: per-credential usage plans.
//!
//! Each API key carries a monthly quota and a token-bucket throttle.
//! Admission is increment-then-serve: the quota counter moves before the
//! throttle check, so a request denied by the throttle still counts against
//! quota. State is synchronized per credential; unrelated keys never
//! contend on one lock. Denials are steady-state outcomes under load and
//! stay cheap to produce.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{Datelike, Utc};

use crate::config::CredentialConfig;

/// Why an authorization was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deny {
    /// Credential missing or unknown.
    Unauthenticated,
    /// Monthly quota exhausted for the current period.
    QuotaExceeded,
    /// Token bucket empty.
    RateLimited,
}

/// Calendar period a quota counter belongs to (year, month).
type Period = (i32, u32);

#[derive(Debug)]
struct ThrottleState {
    quota_used: u64,
    period: Period,
    /// Available tokens, bounded in [0, burst_capacity].
    tokens: f64,
    last_refill: Instant,
}

struct CredentialEntry {
    plan: CredentialConfig,
    state: Mutex<ThrottleState>,
}

pub struct AccessGovernor {
    credentials: HashMap<String, CredentialEntry>,
}

impl AccessGovernor {
    pub fn new(plans: Vec<CredentialConfig>) -> Self {
        let now = Instant::now();
        let period = current_period();
        let credentials = plans
            .into_iter()
            .map(|plan| {
                let state = Mutex::new(ThrottleState {
                    quota_used: 0,
                    period,
                    tokens: plan.burst_capacity as f64,
                    last_refill: now,
                });
                (plan.id.clone(), CredentialEntry { plan, state })
            })
            .collect();
        Self { credentials }
    }

    /// Admit or refuse a request. Uncredentialed routes are always allowed.
    pub fn authorize(
        &self,
        credential_id: Option<&str>,
        requires_credential: bool,
    ) -> Result<(), Deny> {
        self.authorize_at(credential_id, requires_credential, Instant::now(), current_period())
    }

    /// Same as [`authorize`](Self::authorize) with the clock injected, so
    /// refill and rollover behavior is testable.
    fn authorize_at(
        &self,
        credential_id: Option<&str>,
        requires_credential: bool,
        now: Instant,
        period: Period,
    ) -> Result<(), Deny> {
        if !requires_credential {
            return Ok(());
        }

        let entry = credential_id
            .and_then(|id| self.credentials.get(id))
            .ok_or(Deny::Unauthenticated)?;

        let mut state = entry.state.lock().unwrap_or_else(|e| e.into_inner());

        // Quota period rollover happens before the quota check.
        if state.period != period {
            state.period = period;
            state.quota_used = 0;
        }
        if state.quota_used >= entry.plan.quota_limit {
            return Err(Deny::QuotaExceeded);
        }
        state.quota_used += 1;

        // Lazy token refill; no background timer.
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * entry.plan.rate_per_sec)
            .min(entry.plan.burst_capacity as f64);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            Err(Deny::RateLimited)
        }
    }

    #[cfg(test)]
    fn quota_used(&self, id: &str) -> u64 {
        self.credentials[id].state.lock().unwrap().quota_used
    }
}

fn current_period() -> Period {
    let now = Utc::now();
    (now.year(), now.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn governor(quota: u64, burst: u32, rate: f64) -> AccessGovernor {
        AccessGovernor::new(vec![CredentialConfig {
            id: "key".into(),
            quota_limit: quota,
            burst_capacity: burst,
            rate_per_sec: rate,
        }])
    }

    #[test]
    fn uncredentialed_routes_always_allow() {
        let g = governor(0, 0, 0.0);
        assert_eq!(g.authorize(None, false), Ok(()));
        assert_eq!(g.authorize(Some("unknown"), false), Ok(()));
    }

    #[test]
    fn missing_or_unknown_key_is_unauthenticated() {
        let g = governor(10, 10, 1.0);
        assert_eq!(g.authorize(None, true), Err(Deny::Unauthenticated));
        assert_eq!(g.authorize(Some("nope"), true), Err(Deny::Unauthenticated));
    }

    #[test]
    fn burst_capacity_then_rate_limited() {
        let g = governor(1_000, 5, 1.0);
        let t0 = Instant::now();
        let period = current_period();
        for _ in 0..5 {
            assert_eq!(g.authorize_at(Some("key"), true, t0, period), Ok(()));
        }
        assert_eq!(
            g.authorize_at(Some("key"), true, t0, period),
            Err(Deny::RateLimited)
        );
    }

    #[test]
    fn one_token_refills_after_inverse_rate() {
        let g = governor(1_000, 2, 0.5);
        let t0 = Instant::now();
        let period = current_period();
        assert_eq!(g.authorize_at(Some("key"), true, t0, period), Ok(()));
        assert_eq!(g.authorize_at(Some("key"), true, t0, period), Ok(()));
        assert_eq!(
            g.authorize_at(Some("key"), true, t0, period),
            Err(Deny::RateLimited)
        );

        // 1/rate = 2 seconds buys exactly one more admission.
        let t1 = t0 + Duration::from_secs(2);
        assert_eq!(g.authorize_at(Some("key"), true, t1, period), Ok(()));
        assert_eq!(
            g.authorize_at(Some("key"), true, t1, period),
            Err(Deny::RateLimited)
        );
    }

    #[test]
    fn refill_never_exceeds_burst_capacity() {
        let g = governor(1_000, 3, 100.0);
        let t0 = Instant::now();
        let period = current_period();
        // A long idle period refills to capacity, not beyond.
        let t1 = t0 + Duration::from_secs(3600);
        for _ in 0..3 {
            assert_eq!(g.authorize_at(Some("key"), true, t1, period), Ok(()));
        }
        assert_eq!(
            g.authorize_at(Some("key"), true, t1, period),
            Err(Deny::RateLimited)
        );
    }

    #[test]
    fn exactly_quota_limit_admissions_per_period() {
        let g = governor(3, 100, 1_000.0);
        let t0 = Instant::now();
        let period = (2026, 8);
        for _ in 0..3 {
            assert_eq!(g.authorize_at(Some("key"), true, t0, period), Ok(()));
        }
        assert_eq!(
            g.authorize_at(Some("key"), true, t0, period),
            Err(Deny::QuotaExceeded)
        );
    }

    #[test]
    fn quota_denial_takes_precedence_over_available_tokens() {
        let g = governor(1, 100, 1_000.0);
        let t0 = Instant::now();
        let period = (2026, 8);
        assert_eq!(g.authorize_at(Some("key"), true, t0, period), Ok(()));
        // Tokens remain, but quota is spent.
        assert_eq!(
            g.authorize_at(Some("key"), true, t0, period),
            Err(Deny::QuotaExceeded)
        );
    }

    #[test]
    fn throttled_request_still_counts_against_quota() {
        let g = governor(10, 1, 0.001);
        let t0 = Instant::now();
        let period = (2026, 8);
        assert_eq!(g.authorize_at(Some("key"), true, t0, period), Ok(()));
        assert_eq!(
            g.authorize_at(Some("key"), true, t0, period),
            Err(Deny::RateLimited)
        );
        // Two admissions attempted, two quota units consumed.
        assert_eq!(g.quota_used("key"), 2);
    }

    #[test]
    fn quota_resets_at_period_boundary() {
        let g = governor(1, 100, 1_000.0);
        let t0 = Instant::now();
        assert_eq!(g.authorize_at(Some("key"), true, t0, (2026, 8)), Ok(()));
        assert_eq!(
            g.authorize_at(Some("key"), true, t0, (2026, 8)),
            Err(Deny::QuotaExceeded)
        );
        // New calendar month: counter resets before the check.
        assert_eq!(g.authorize_at(Some("key"), true, t0, (2026, 9)), Ok(()));
    }
}
