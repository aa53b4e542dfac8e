//! # hive-persist
//!
//! Filesystem persistence for the hive runtime: a directory-of-JSON entity
//! store with atomic writes and self-healing init, an ordered list on top
//! of it, and the adapter traits the runtime persists swarm/state/storage
//! resources through (filesystem default, in-memory for tests).

pub mod adapters;
pub mod base;
pub mod list;

pub use adapters::{
    FsPersistence, MemoryPersistence, StatePersistence, StoragePersistence, SwarmPersistence,
};
pub use base::PersistBase;
pub use list::PersistList;
