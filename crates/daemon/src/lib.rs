//! Daemon — the migration orchestrator that walks the dependency-ordered
//! phase sequence and fans work out across projects.

pub mod orchestrator;
