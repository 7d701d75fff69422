//! # Sesame
//!
//! `sesame` is an authentication backend built around email ownership. It
//! implements verification-code based registration and login: a client
//! requests a 6-digit code, proves ownership of the mailbox by echoing it
//! back, and receives a signed JWT session token.
//!
//! ## Flows
//!
//! - **send-code:** rate-limited issuance of a short-lived (10 minute) code,
//!   delivered over SMTP. The code is persisted only after the transport
//!   confirms delivery, so a failed send never blocks a legitimate resend.
//! - **register / login:** the code is matched against unexpired records of
//!   the right kind, consumed, and a JWT is issued. Consumption deletes every
//!   outstanding code for the address to prevent replay.
//! - **me:** bearer-token protected profile lookup.
//!
//! ## Abuse protection
//!
//! Code sending is gated per client IP and per `ip:email` composite key, with
//! a general per-IP cap on all API traffic and a failed-attempt cap on auth
//! endpoints. Counters live in process memory and are approximate by design;
//! multiple instances do not share state.

pub mod api;
pub mod cli;
