//! Harness — reliability infrastructure for calls into the TestRail and
//! Qase HTTP APIs.
//!
//! This crate sits between the migration orchestrator and the integration
//! clients. It provides:
//! - A circuit breaker that stops hammering an API once it starts failing
//! - A rate gate that paces outbound requests to each API's documented limit
//! - Bounded worker pools that cap how many requests run concurrently

pub mod circuit_breaker;
pub mod pool;
pub mod rate_limiter;
