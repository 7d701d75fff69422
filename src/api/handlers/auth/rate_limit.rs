//! In-memory rate limiting for auth flows and general API traffic.
//!
//! Counters are fixed windows keyed by client IP or an `ip:email` composite,
//! stored in a process-local map behind a mutex. They are approximate:
//! a restart clears them and multiple instances do not share counts.
//! Expired entries are swept opportunistically on roughly 1% of insertions.

use rand::Rng;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const SEND_CODE_WINDOW: Duration = Duration::from_secs(15 * 60);
const SEND_CODE_IP_MAX: u32 = 5;
const SEND_CODE_IP_MAX_AUTHENTICATED: u32 = 10;
const SEND_CODE_COMPOSITE_MAX: u32 = 5;

const API_WINDOW: Duration = Duration::from_secs(15 * 60);
const API_MAX: u32 = 100;

const AUTH_FAILURE_WINDOW: Duration = Duration::from_secs(60 * 60);
const AUTH_FAILURE_MAX: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: u64 },
}

impl RateLimitDecision {
    #[must_use]
    pub const fn is_limited(self) -> bool {
        matches!(self, Self::Limited { .. })
    }
}

pub trait RateLimiter: Send + Sync {
    /// Gate a send-code request. Both the per-IP and the `ip:email`
    /// composite counter increment; the stricter one wins.
    fn check_send_code(
        &self,
        ip: Option<&str>,
        email: &str,
        authenticated: bool,
    ) -> RateLimitDecision;

    /// Gate any API request by client IP.
    fn check_api(&self, ip: Option<&str>) -> RateLimitDecision;

    /// Gate auth endpoints by prior failures. Does not increment.
    fn check_auth(&self, ip: Option<&str>) -> RateLimitDecision;

    /// Count a failed auth attempt against the client IP.
    fn record_auth_failure(&self, ip: Option<&str>);
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_send_code(
        &self,
        _ip: Option<&str>,
        _email: &str,
        _authenticated: bool,
    ) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_api(&self, _ip: Option<&str>) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_auth(&self, _ip: Option<&str>) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn record_auth_failure(&self, _ip: Option<&str>) {}
}

#[derive(Debug)]
struct CounterEntry {
    count: u32,
    reset_at: Instant,
}

pub struct MemoryRateLimiter {
    entries: Mutex<HashMap<String, CounterEntry>>,
    allowlist: Vec<String>,
    bypass_private: bool,
}

impl MemoryRateLimiter {
    /// `bypass_private` skips loopback and private-range clients, which is
    /// only safe outside production.
    #[must_use]
    pub fn new(allowlist: Vec<String>, bypass_private: bool) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            allowlist: allowlist.iter().map(|ip| normalize_ip(ip)).collect(),
            bypass_private,
        }
    }

    fn exempt(&self, ip: &str) -> bool {
        if self.allowlist.iter().any(|allowed| allowed == ip) {
            return true;
        }
        if self.bypass_private {
            if let Ok(addr) = ip.parse::<IpAddr>() {
                return is_loopback_or_private(addr);
            }
        }
        false
    }

    /// Increment a counter and report whether it crossed its limit.
    fn hit(&self, key: String, max: u32, window: Duration) -> RateLimitDecision {
        let now = Instant::now();
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            // A poisoned lock means a panic elsewhere; fail open.
            Err(poisoned) => poisoned.into_inner(),
        };

        if rand::thread_rng().gen_ratio(1, 100) {
            entries.retain(|_, entry| entry.reset_at > now);
        }

        let entry = entries.entry(key).or_insert_with(|| CounterEntry {
            count: 0,
            reset_at: now + window,
        });
        if entry.reset_at <= now {
            entry.count = 0;
            entry.reset_at = now + window;
        }
        entry.count = entry.count.saturating_add(1);

        if entry.count > max {
            RateLimitDecision::Limited {
                retry_after: retry_after(entry.reset_at, now),
            }
        } else {
            RateLimitDecision::Allowed
        }
    }

    /// Read a counter without incrementing it.
    fn peek(&self, key: &str, max: u32) -> RateLimitDecision {
        let now = Instant::now();
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.get(key) {
            Some(entry) if entry.reset_at > now && entry.count >= max => {
                RateLimitDecision::Limited {
                    retry_after: retry_after(entry.reset_at, now),
                }
            }
            _ => RateLimitDecision::Allowed,
        }
    }
}

impl RateLimiter for MemoryRateLimiter {
    fn check_send_code(
        &self,
        ip: Option<&str>,
        email: &str,
        authenticated: bool,
    ) -> RateLimitDecision {
        let ip = client_key(ip);
        if self.exempt(&ip) {
            return RateLimitDecision::Allowed;
        }

        let ip_max = if authenticated {
            SEND_CODE_IP_MAX_AUTHENTICATED
        } else {
            SEND_CODE_IP_MAX
        };

        // Both counters increment on every call so neither can be starved.
        let by_ip = self.hit(format!("send:{ip}"), ip_max, SEND_CODE_WINDOW);
        let by_pair = self.hit(
            format!("send:{ip}:{}", email.to_lowercase()),
            SEND_CODE_COMPOSITE_MAX,
            SEND_CODE_WINDOW,
        );

        match (by_ip, by_pair) {
            (RateLimitDecision::Allowed, RateLimitDecision::Allowed) => RateLimitDecision::Allowed,
            (RateLimitDecision::Limited { retry_after }, RateLimitDecision::Allowed)
            | (RateLimitDecision::Allowed, RateLimitDecision::Limited { retry_after }) => {
                RateLimitDecision::Limited { retry_after }
            }
            (
                RateLimitDecision::Limited { retry_after: a },
                RateLimitDecision::Limited { retry_after: b },
            ) => RateLimitDecision::Limited {
                retry_after: a.max(b),
            },
        }
    }

    fn check_api(&self, ip: Option<&str>) -> RateLimitDecision {
        let ip = client_key(ip);
        if self.exempt(&ip) {
            return RateLimitDecision::Allowed;
        }
        self.hit(format!("api:{ip}"), API_MAX, API_WINDOW)
    }

    fn check_auth(&self, ip: Option<&str>) -> RateLimitDecision {
        let ip = client_key(ip);
        if self.exempt(&ip) {
            return RateLimitDecision::Allowed;
        }
        self.peek(&format!("authfail:{ip}"), AUTH_FAILURE_MAX)
    }

    fn record_auth_failure(&self, ip: Option<&str>) {
        let ip = client_key(ip);
        if self.exempt(&ip) {
            return;
        }
        // No limit check here; check_auth reads the counter before work.
        let _ = self.hit(format!("authfail:{ip}"), u32::MAX, AUTH_FAILURE_WINDOW);
    }
}

fn retry_after(reset_at: Instant, now: Instant) -> u64 {
    reset_at.saturating_duration_since(now).as_secs().max(1)
}

fn client_key(ip: Option<&str>) -> String {
    ip.map_or_else(|| "unknown".to_string(), normalize_ip)
}

fn normalize_ip(ip: &str) -> String {
    let trimmed = ip.trim();
    trimmed
        .strip_prefix("::ffff:")
        .unwrap_or(trimmed)
        .to_string()
}

fn is_loopback_or_private(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}
