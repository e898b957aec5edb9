//! Artifact caching: keys, policy, stores, and the machinery that fills them.
//!
//! - [`SymbolKey`]: what an artifact is stored under.
//! - [`CachePolicy`]: which upstream responses are stored, and for how long.
//! - [`CacheStore`]: the storage contract, with [`MemoryStore`] and
//!   [`DiskStore`] implementations.
//! - [`splitter`]: duplicating an upstream body for the client and the store.
//! - [`persist`]: size-bounded background writes and their supervisor.

pub mod disk;
pub mod key;
pub mod memory;
pub mod persist;
pub mod policy;
pub mod splitter;
pub mod store;

pub use disk::DiskStore;
pub use key::SymbolKey;
pub use memory::MemoryStore;
pub use persist::{PersistError, PersistJob, PersistStats, PersistSupervisor};
pub use policy::{CachePolicy, Decision};
pub use store::{CacheStore, CachedArtifact, StoreError, StoredEntry};
