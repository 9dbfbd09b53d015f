//! Providers Module - Backends & External Integrations
//!
//! Persistence (PostgreSQL / memory), search (database / Meilisearch),
//! object storage (S3 / memory) and the virtual try-on upstream.

pub mod memory;
pub mod meilisearch;
pub mod postgres;
pub mod s3_storage;
pub mod search;
pub mod storage;
pub mod store;
pub mod tryon;

pub use memory::MemoryStore;
pub use meilisearch::MeiliSearch;
pub use postgres::PgStore;
pub use s3_storage::S3Storage;
pub use search::{DatabaseSearch, SearchIndex};
pub use storage::{MemoryStorage, ObjectStorage};
pub use store::Store;
pub use tryon::{TryOnClient, TryOnResult};
