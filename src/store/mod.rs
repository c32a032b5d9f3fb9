//! Byte store abstraction used for persistence.
//!
//! Segments, liveness files and the manifest are written through a
//! `ByteStore`: an append-only temp file is created, written, made durable and
//! then atomically published under its final name. Readers open whole files
//! as `Bytes`.
//!
//! ## Usage
//!
//! ```rust
//! use segdex::store::{ByteStore, MemoryStore, PendingFile};
//!
//! # fn main() -> Result<(), segdex::Error> {
//! let store = MemoryStore::new();
//!
//! let mut file = PendingFile::create(&store)?;
//! file.write(b"hello")?;
//! file.flush_durable()?;
//! file.publish("greeting")?;
//!
//! assert_eq!(&store.open("greeting")?[..], b"hello");
//! # Ok(())
//! # }
//! ```

pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use crate::error::Result;
use bytes::Bytes;
use std::fmt;

/// Handle to an unpublished temp file.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TempHandle {
    id: u64,
}

impl TempHandle {
    /// Creates a handle. Intended for `ByteStore` implementations.
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    /// Returns the store-assigned id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Durable file storage with atomic publish.
///
/// Every method may fail with `Error::Io`.
pub trait ByteStore: Send + Sync + fmt::Debug {
    /// Creates a new, empty temp file.
    fn create_temp(&self) -> Result<TempHandle>;

    /// Appends bytes to a temp file.
    fn write(&self, handle: &TempHandle, data: &[u8]) -> Result<()>;

    /// Makes everything written to the temp file durable.
    fn flush_durable(&self, handle: &TempHandle) -> Result<()>;

    /// Atomically publishes the temp file under `name`, replacing any existing file.
    fn publish(&self, handle: TempHandle, name: &str) -> Result<()>;

    /// Throws away an unpublished temp file.
    fn discard(&self, handle: TempHandle) -> Result<()>;

    /// Reads a published file.
    fn open(&self, name: &str) -> Result<Bytes>;

    /// Deletes a published file. Deleting a missing file is not an error.
    fn delete(&self, name: &str) -> Result<()>;

    /// Lists every published file name.
    fn list(&self) -> Result<Vec<String>>;

    /// Returns true if `name` is published.
    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.list()?.iter().any(|n| n == name))
    }
}

/// A temp file that is discarded unless published.
pub struct PendingFile<'a> {
    store: &'a dyn ByteStore,
    handle: Option<TempHandle>,
    written: u64,
}

impl<'a> PendingFile<'a> {
    /// Creates a temp file in `store`.
    pub fn create(store: &'a dyn ByteStore) -> Result<Self> {
        let handle = store.create_temp()?;
        Ok(Self { store, handle: Some(handle), written: 0 })
    }

    /// Appends bytes.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if let Some(handle) = &self.handle {
            self.store.write(handle, data)?;
            self.written += data.len() as u64;
        }
        Ok(())
    }

    /// Makes the written bytes durable.
    pub fn flush_durable(&mut self) -> Result<()> {
        match &self.handle {
            Some(handle) => self.store.flush_durable(handle),
            None => Ok(()),
        }
    }

    /// Number of bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Publishes the file under `name`.
    pub fn publish(mut self, name: &str) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.store.publish(handle, name),
            None => Ok(()),
        }
    }
}

impl Drop for PendingFile<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.store.discard(handle) {
                log::warn!("Failed to discard temp file: {}", e);
            }
        }
    }
}

/// Writes `data` as a durable file named `name` in one step.
pub fn write_file(store: &dyn ByteStore, name: &str, data: &[u8]) -> Result<()> {
    let mut file = PendingFile::create(store)?;
    file.write(data)?;
    file.flush_durable()?;
    file.publish(name)
}
