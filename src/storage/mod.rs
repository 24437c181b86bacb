//! Storage backend boundary
//!
//! The search core never talks to a concrete storage system directly. It
//! consumes the [`StorageGateway`] trait for authentication, space listing,
//! tree walking and path resolution. [`MemoryGateway`] is the in-process
//! implementation used for fixtures, local runs and tests.

mod error;
mod gateway;
mod memory;

pub use error::{StorageError, StorageResult};
pub use gateway::{AuthToken, ResourceInfo, StorageGateway};
pub use memory::{mime_from_name, MemoryGateway};
