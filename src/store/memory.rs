//! In-memory byte store for tests and ephemeral indexes.

use super::{ByteStore, TempHandle};
use crate::error::{Error, Result};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A `ByteStore` kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<String, Bytes>>,
    temps: Mutex<HashMap<u64, Vec<u8>>>,
    next_temp: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of temp files that are neither published nor discarded.
    pub fn pending_temps(&self) -> usize {
        self.temps.lock().len()
    }

    fn missing_temp(handle: &TempHandle) -> Error {
        Error::internal(format!("Unknown temp handle {}", handle.id()))
    }
}

impl ByteStore for MemoryStore {
    fn create_temp(&self) -> Result<TempHandle> {
        let id = self.next_temp.fetch_add(1, Ordering::SeqCst);
        self.temps.lock().insert(id, Vec::new());
        Ok(TempHandle::new(id))
    }

    fn write(&self, handle: &TempHandle, data: &[u8]) -> Result<()> {
        let mut temps = self.temps.lock();
        let buf = temps.get_mut(&handle.id()).ok_or_else(|| Self::missing_temp(handle))?;
        buf.extend_from_slice(data);
        Ok(())
    }

    fn flush_durable(&self, handle: &TempHandle) -> Result<()> {
        if self.temps.lock().contains_key(&handle.id()) {
            Ok(())
        } else {
            Err(Self::missing_temp(handle))
        }
    }

    fn publish(&self, handle: TempHandle, name: &str) -> Result<()> {
        let data = self.temps.lock().remove(&handle.id()).ok_or_else(|| Self::missing_temp(&handle))?;
        self.files.write().insert(name.to_string(), Bytes::from(data));
        Ok(())
    }

    fn discard(&self, handle: TempHandle) -> Result<()> {
        self.temps.lock().remove(&handle.id());
        Ok(())
    }

    fn open(&self, name: &str) -> Result<Bytes> {
        self.files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("File does not exist: {}", name)))
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.files.write().remove(name);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.files.read().contains_key(name))
    }
}
