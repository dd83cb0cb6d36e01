//! Gatekeeper - Per-User Request Admission Service
//!
//! This crate implements a fixed-window rate limiter keyed by caller-supplied
//! user identity, and an HTTP service that guards its routes with it. Each
//! user may make a fixed number of requests per window; the window opens with
//! the user's first admitted request and resets entirely once it closes.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
