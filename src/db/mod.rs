//! Persistence for Covenant
//!
//! MongoDB in production, an in-memory store for dev mode and tests. Both
//! implement the [`Store`] traits the services are written against.

mod memory;
pub mod mongo;
pub mod schemas;
mod store;

pub use memory::MemoryStore;
pub use mongo::{MongoClient, MongoCollection, MongoStore};
pub use store::{
    AuditStore, AuthCodeStore, IdentityStore, PermitStore, RefreshTokenStore,
    SigningKeyRepository, Store, StoreError, StoreHealth, StoreResult,
};
