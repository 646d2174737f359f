//! Session and message persistence abstractions for Chatkeep.
//!
//! `SessionRepository` is the trait the infrastructure layer implements;
//! `ChatService` wraps a repository with validation and lookup policy.

pub mod repository;
pub mod service;

pub use repository::SessionRepository;
pub use service::ChatService;
