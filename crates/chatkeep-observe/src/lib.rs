//! Observability for Chatkeep.
//!
//! Hosts the tracing subscriber initialization used by anything embedding
//! the store (tests, tools, services).

pub mod tracing_setup;
