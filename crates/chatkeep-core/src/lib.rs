//! Business logic and repository trait definitions for Chatkeep.
//!
//! This crate defines the "port" (the `SessionRepository` trait) that the
//! infrastructure layer implements, and the `ChatService` that enforces
//! input validation and maps absent rows to errors. It depends only on
//! `chatkeep-types` -- never on `chatkeep-infra` or any database crate.

pub mod store;
