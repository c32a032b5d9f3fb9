//! Directory-backed byte store.

use super::{ByteStore, TempHandle};
use crate::error::{Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Extension of unpublished temp files.
pub const TEMP_EXTENSION: &str = "tmp";

/// A `ByteStore` over one filesystem directory.
///
/// Temp files live next to published files as `NNNNNN.tmp`; publishing is a
/// `rename` followed by a directory sync.
#[derive(Debug)]
pub struct FsStore {
    dir: PathBuf,
    next_temp: AtomicU64,
    temps: Mutex<HashMap<u64, BufWriter<File>>>,
}

impl FsStore {
    /// Opens a store over `dir`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, next_temp: AtomicU64::new(1), temps: Mutex::new(HashMap::new()) })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn temp_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{:06}.{}", id, TEMP_EXTENSION))
    }

    fn final_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::invalid_argument(format!("Invalid file name: {:?}", name)));
        }
        Ok(self.dir.join(name))
    }

    fn missing_temp(handle: &TempHandle) -> Error {
        Error::internal(format!("Unknown temp handle {}", handle.id()))
    }

    fn sync_dir(&self) -> Result<()> {
        #[cfg(unix)]
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }
}

impl ByteStore for FsStore {
    fn create_temp(&self) -> Result<TempHandle> {
        let id = self.next_temp.fetch_add(1, Ordering::SeqCst);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.temp_path(id))?;
        self.temps.lock().insert(id, BufWriter::new(file));
        Ok(TempHandle::new(id))
    }

    fn write(&self, handle: &TempHandle, data: &[u8]) -> Result<()> {
        let mut temps = self.temps.lock();
        let writer = temps.get_mut(&handle.id()).ok_or_else(|| Self::missing_temp(handle))?;
        writer.write_all(data)?;
        Ok(())
    }

    fn flush_durable(&self, handle: &TempHandle) -> Result<()> {
        let mut temps = self.temps.lock();
        let writer = temps.get_mut(&handle.id()).ok_or_else(|| Self::missing_temp(handle))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    fn publish(&self, handle: TempHandle, name: &str) -> Result<()> {
        let target = self.final_path(name)?;
        let writer = self.temps.lock().remove(&handle.id()).ok_or_else(|| Self::missing_temp(&handle))?;
        let file = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        drop(file);

        fs::rename(self.temp_path(handle.id()), &target)?;
        self.sync_dir()?;
        Ok(())
    }

    fn discard(&self, handle: TempHandle) -> Result<()> {
        self.temps.lock().remove(&handle.id());
        match fs::remove_file(self.temp_path(handle.id())) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn open(&self, name: &str) -> Result<Bytes> {
        let path = self.final_path(name)?;
        match fs::read(&path) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::not_found(format!("File does not exist: {:?}", path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.final_path(name)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.final_path(name)?.is_file())
    }
}
