//! Core library for the TestRail -> Qase migration engine.
//!
//! Provides the domain types, the in-memory mapping store, the layered TOML
//! configuration, the content transforms needed for target payloads to
//! validate, and the per-run statistics counters.

pub mod config;
pub mod fieldvalue;
pub mod mapping;
pub mod stats;
pub mod text;
pub mod types;
