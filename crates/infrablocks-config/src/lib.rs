//! Versioned configuration store
//!
//! Configuration values are scoped to a cloud, an environment or a tenant
//! and never overwritten: every write appends a row with the next version
//! of its key, and readers resolve the highest version per key.
//!
//! ```text
//! ConfigurationStore ──> ConfigurationBackend ──┬── MemoryBackend
//!   (version numbering,    (append-only rows,   └── FileBackend (JSON table)
//!    write serialization)   unique versions)
//! ```

pub mod backend;
pub mod entity;
pub mod error;
pub mod file;
pub mod store;
pub mod value;

pub use backend::{ConfigurationBackend, MemoryBackend};
pub use entity::{EntityId, EntityScope};
pub use error::{ConfigError, Result};
pub use file::FileBackend;
pub use store::{ConfigurationStore, StoreOptions};
pub use value::{ConfigurationRow, ConfigurationValue, LatestValues};
