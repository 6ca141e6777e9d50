//! Storage abstraction for the single "latest image" artifact.
//!
//! An [`ImageStore`] holds at most one image. Every
//! [`replace`](ImageStore::replace) overwrites it; there is no history.
//! Implementations:
//!
//! - [`FsImageStore`](crate::persistence::FsImageStore): a file on any
//!   `std::fs` filesystem, including SPIFFS mounted through the ESP-IDF VFS
//! - [`MemoryImageStore`](crate::hal::MemoryImageStore): in-memory, with
//!   failure injection for tests

use std::io::Read;

use crate::error::StorageError;

/// Store for exactly one image file.
pub trait ImageStore {
    /// Reader over the stored bytes.
    type Reader: Read;

    /// Replace the stored image with `header` followed by `payload`.
    ///
    /// On error the previous image should be left intact where the backend
    /// can guarantee it.
    fn replace(&mut self, header: &[u8], payload: &[u8]) -> Result<(), StorageError>;

    /// Open the stored image for reading, `Ok(None)` if there is none yet.
    fn open(&self) -> Result<Option<Self::Reader>, StorageError>;

    /// Cheap existence probe for startup diagnostics.
    fn exists(&self) -> bool;
}
