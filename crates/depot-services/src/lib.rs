//! Depot Services Layer
//!
//! Background services that run on a timer next to the job handlers rather
//! than through the broker. Currently this is the retention sweeper, which
//! purges expired files from object storage and the database.

#[cfg(feature = "cleanup")]
pub mod cleanup;

#[cfg(feature = "cleanup")]
pub use cleanup::{CleanupHandle, CleanupService, SweepStats};

pub use depot_storage::{create_storage, MemoryStorage, Storage, StorageBackend, StorageError};
#[cfg(feature = "storage-s3")]
pub use depot_storage::S3Storage;
