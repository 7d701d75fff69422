//! Auth handlers and supporting modules.
//!
//! The flow is code-based: `send-code` issues a short-lived 6-digit code over
//! email, `register`/`login` redeem it and return a JWT, `me` resolves the
//! bearer token back into a user.
//!
//! ## Rate limiting
//!
//! Code issuance is capped per client IP (5 per 15 minutes anonymous, 10
//! authenticated) and per `ip:email` pair (5 per 15 minutes). Register and
//! login share a failed-attempt cap of 10 per hour per IP. All counters are
//! process-local.

pub(crate) mod code;
pub mod login;
pub mod me;
mod rate_limit;
pub mod register;
pub mod send_code;
pub(crate) mod session;
mod state;
mod storage;
pub(crate) mod types;
mod utils;

pub use rate_limit::{MemoryRateLimiter, NoopRateLimiter, RateLimitDecision, RateLimiter};
pub use state::{AuthConfig, AuthState};
pub use storage::spawn_expiry_sweeper;
pub(crate) use utils::extract_client_ip;
