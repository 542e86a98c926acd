//! Capability seams for the filesystem and the clock.
//!
//! The cache core never calls `std::fs` or `SystemTime::now()` directly; it
//! goes through these traits instead, so storage and the passage of time
//! can be swapped for fakes in tests.
use std::{
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// One directory entry as seen by [`Filesystem::read_dir`].
#[derive(Clone, Debug)]
pub struct DirEntryInfo {
    pub name: String,
    pub len: u64,
    pub mtime: SystemTime,
}

/// Everything the cache needs from a filesystem.
pub trait Filesystem: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>>;
    fn set_mtime(&self, path: &Path, time: SystemTime) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool {
        self.read(path).is_ok() || self.read_dir(path).is_ok()
    }
}

/// The clock the cache stamps entries and journal records with.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// [`Filesystem`] backed by `std::fs`, with mtimes handled by `filetime`
/// (std's own mtime setters are unstable).
#[derive(Clone, Copy, Debug, Default)]
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        std::fs::write(path, bytes)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let meta = entry.metadata()?;
            out.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                len: meta.len(),
                mtime: meta.modified()?,
            });
        }
        Ok(out)
    }

    fn set_mtime(&self, path: &Path, time: SystemTime) -> io::Result<()> {
        filetime::set_file_mtime(path, filetime::FileTime::from_system_time(time))
    }
}

/// [`Clock`] backed by the system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[cfg(any(test, feature = "test"))]
pub mod test {
    use super::*;
    use parking_lot::Mutex;
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[derive(Clone, Default)]
    struct Entry {
        bytes: Vec<u8>,
        mtime: SystemTime,
    }

    /// An in-memory [`Filesystem`] double, keyed by full path.
    #[derive(Clone, Default)]
    pub struct InMemoryFilesystem(Arc<Mutex<HashMap<PathBuf, Entry>>>);

    impl InMemoryFilesystem {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Filesystem for InMemoryFilesystem {
        fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
            Ok(())
        }

        fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
            self.0.lock().retain(|p, _| !p.starts_with(path));
            Ok(())
        }

        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.0
                .lock()
                .get(path)
                .map(|e| e.bytes.clone())
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }

        fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
            let now = self
                .0
                .lock()
                .get(path)
                .map(|e| e.mtime)
                .unwrap_or(SystemTime::UNIX_EPOCH);
            self.0.lock().insert(
                path.to_owned(),
                Entry {
                    bytes: bytes.to_owned(),
                    mtime: now.max(SystemTime::now()),
                },
            );
            Ok(())
        }

        fn remove_file(&self, path: &Path) -> io::Result<()> {
            self.0.lock().remove(path);
            Ok(())
        }

        fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntryInfo>> {
            let guard = self.0.lock();
            Ok(guard
                .iter()
                .filter_map(|(p, e)| {
                    let parent = p.parent()?;
                    if parent != path {
                        return None;
                    }
                    Some(DirEntryInfo {
                        name: p.file_name()?.to_string_lossy().into_owned(),
                        len: e.bytes.len() as u64,
                        mtime: e.mtime,
                    })
                })
                .collect())
        }

        fn set_mtime(&self, path: &Path, time: SystemTime) -> io::Result<()> {
            match self.0.lock().get_mut(path) {
                Some(e) => {
                    e.mtime = time;
                    Ok(())
                }
                None => Err(io::Error::from(io::ErrorKind::NotFound)),
            }
        }
    }

    /// A manually-advanced [`Clock`] for deterministic ordering assertions.
    #[derive(Clone)]
    pub struct ManualClock {
        base: SystemTime,
        ticks: Arc<AtomicU64>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self {
                base: SystemTime::now(),
                ticks: Arc::default(),
            }
        }
    }

    impl ManualClock {
        pub fn advance(&self, by: Duration) {
            self.ticks
                .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> SystemTime {
            self.base + Duration::from_nanos(self.ticks.load(Ordering::SeqCst))
        }
    }
}
