//! Core Module - Marketplace Business Logic
//!
//! Authentication, validation, trigram ranking, chat fan-out and the
//! orphaned upload sweeper. Handlers stay thin and call into here.

pub mod auth;
pub mod chat;
pub mod chat_hub;
pub mod cleanup;
pub mod trigram;
pub mod validation;

pub use auth::{Claims, IssuedTokens, TokenService};
pub use chat_hub::ChatHub;
pub use cleanup::{spawn_cleanup_task, sweep_orphans, CleanupReport};
