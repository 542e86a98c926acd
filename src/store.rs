//! One file per key under the payload folder.
use crate::{error::Result, fs::Filesystem, layout::Layout};
use std::{sync::Arc, time::SystemTime};

#[derive(Clone)]
pub struct PayloadFileInfo {
    pub key: String,
    pub size: u64,
    pub mtime: SystemTime,
}

#[derive(Clone)]
pub struct PayloadStore {
    layout: Layout,
    fs: Arc<dyn Filesystem>,
}

impl PayloadStore {
    pub fn new(layout: Layout, fs: Arc<dyn Filesystem>) -> Self {
        Self { layout, fs }
    }

    pub fn ensure_dir(&self) -> Result<()> {
        self.fs.create_dir_all(&self.layout.payload_dir())?;
        Ok(())
    }

    pub fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.fs.read(&self.layout.payload_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.ensure_dir()?;
        self.fs.write(&self.layout.payload_path(key), bytes)?;
        Ok(())
    }

    /// Best-effort unlink; missing files are not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.fs.remove_file(&self.layout.payload_path(key))?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<PayloadFileInfo>> {
        self.ensure_dir()?;
        Ok(self
            .fs
            .read_dir(&self.layout.payload_dir())?
            .into_iter()
            .map(|entry| PayloadFileInfo {
                key: entry.name,
                size: entry.len,
                mtime: entry.mtime,
            })
            .collect())
    }

    pub fn total_size(&self) -> Result<u64> {
        Ok(self.list()?.iter().map(|f| f.size).sum())
    }

    pub fn set_mtime(&self, key: &str, time: SystemTime) -> Result<()> {
        self.fs.set_mtime(&self.layout.payload_path(key), time)?;
        Ok(())
    }
}
