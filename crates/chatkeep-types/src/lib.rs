//! Shared domain types for Chatkeep.
//!
//! This crate contains the core domain types used across the Chatkeep
//! session/message store: ChatSession, ChatMessage, and their associated
//! error and config types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
