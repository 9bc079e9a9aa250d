//! Depot Storage Library
//!
//! This crate provides the object storage abstraction used by the worker
//! handlers and the cleanup sweeper, with an S3-compatible backend and an
//! in-memory backend that honours the same contract.
//!
//! # Storage keys
//!
//! Keys are opaque relative paths. They must be non-empty, must not contain
//! `..` and must not start with `/`; every backend rejects other keys with
//! [`StorageError::InvalidKey`].

pub mod factory;
pub mod keys;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use depot_core::StorageBackend;
pub use factory::create_storage;
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ByteReader, ByteStream, Storage, StorageError, StorageObject, StorageResult};
