//! Rate limiting primitives for auth flows.
//!
//! Two ceilings apply: a general one covering the whole API and a much
//! tighter one for `/verify-otp`, since a 6-digit code is a guessable secret
//! worth brute-forcing. Windows are tracked in process memory per client key.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const GENERAL_LIMIT: usize = 1000;
const GENERAL_WINDOW: Duration = Duration::from_secs(15 * 60);
const OTP_LIMIT: usize = 20;
const OTP_WINDOW: Duration = Duration::from_secs(10 * 60);

#[derive(Clone, Copy, Debug)]
pub enum RateLimitAction {
    General,
    VerifyOtp,
}

impl RateLimitAction {
    fn tag(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::VerifyOtp => "verify-otp",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, _email: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Clone, Copy, Debug)]
struct WindowRule {
    max_requests: usize,
    window: Duration,
}

/// In-memory sliding-window limiter keyed by client IP or email.
#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    windows: Mutex<HashMap<String, Vec<Instant>>>,
    general: WindowRule,
    otp: WindowRule,
}

impl SlidingWindowRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            general: WindowRule {
                max_requests: GENERAL_LIMIT,
                window: GENERAL_WINDOW,
            },
            otp: WindowRule {
                max_requests: OTP_LIMIT,
                window: OTP_WINDOW,
            },
        }
    }

    #[must_use]
    pub fn with_otp_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.otp = WindowRule {
            max_requests,
            window,
        };
        self
    }

    #[must_use]
    pub fn with_general_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.general = WindowRule {
            max_requests,
            window,
        };
        self
    }

    fn rule(&self, action: RateLimitAction) -> WindowRule {
        match action {
            RateLimitAction::General => self.general,
            RateLimitAction::VerifyOtp => self.otp,
        }
    }

    fn check(&self, key: String, rule: WindowRule) -> RateLimitDecision {
        let now = Instant::now();
        let Ok(mut windows) = self.windows.lock() else {
            // A poisoned lock means a panic elsewhere; fail closed.
            return RateLimitDecision::Limited;
        };
        // Keys come from client-supplied data (forwarded IPs, emails), so
        // entries whose attempts have all aged out must be dropped or the
        // map grows without bound.
        let longest = self.general.window.max(self.otp.window);
        windows.retain(|_, attempts| {
            attempts.retain(|at| now.duration_since(*at) < longest);
            !attempts.is_empty()
        });
        let attempts = windows.entry(key).or_default();
        attempts.retain(|at| now.duration_since(*at) < rule.window);
        if attempts.len() >= rule.max_requests {
            return RateLimitDecision::Limited;
        }
        attempts.push(now);
        RateLimitDecision::Allowed
    }
}

impl Default for SlidingWindowRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter for SlidingWindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        // Clients without a resolvable address share one bucket.
        let key = format!("{}:ip:{}", action.tag(), ip.unwrap_or("unknown"));
        self.check(key, self.rule(action))
    }

    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision {
        let key = format!("{}:email:{}", action.tag(), email);
        self.check(key, self.rule(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::General),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("user@example.com", RateLimitAction::VerifyOtp),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn sliding_window_limits_after_max_requests() {
        let limiter =
            SlidingWindowRateLimiter::new().with_otp_limit(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert_eq!(
                limiter.check_ip(Some("1.2.3.4"), RateLimitAction::VerifyOtp),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::VerifyOtp),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn buckets_are_independent_per_client_and_action() {
        let limiter = SlidingWindowRateLimiter::new()
            .with_otp_limit(1, Duration::from_secs(60))
            .with_general_limit(1, Duration::from_secs(60));

        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::VerifyOtp),
            RateLimitDecision::Allowed
        );
        // Other clients and other actions are unaffected.
        assert_eq!(
            limiter.check_ip(Some("5.6.7.8"), RateLimitAction::VerifyOtp),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::General),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::VerifyOtp),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn stale_client_keys_are_reclaimed() {
        let limiter = SlidingWindowRateLimiter::new()
            .with_otp_limit(5, Duration::from_millis(10))
            .with_general_limit(5, Duration::from_millis(10));
        for i in 0..50 {
            let ip = format!("10.0.0.{i}");
            assert_eq!(
                limiter.check_ip(Some(&ip), RateLimitAction::VerifyOtp),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(limiter.windows.lock().expect("lock").len(), 50);

        std::thread::sleep(Duration::from_millis(20));
        limiter.check_ip(Some("10.0.1.1"), RateLimitAction::General);
        // Only the fresh key survives; the 50 expired ones are gone.
        assert_eq!(limiter.windows.lock().expect("lock").len(), 1);
    }

    #[test]
    fn window_expiry_frees_the_bucket() {
        let limiter =
            SlidingWindowRateLimiter::new().with_otp_limit(1, Duration::from_millis(10));
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::VerifyOtp),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::VerifyOtp),
            RateLimitDecision::Limited
        );
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::VerifyOtp),
            RateLimitDecision::Allowed
        );
    }
}
