//! Cache directory layout & paths: pure naming, no I/O.
use std::path::{Path, PathBuf};

/// Derives the payload folder, journal folder, and journal file paths from
/// a cache root directory.
#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn payload_dir(&self) -> PathBuf {
        self.root.join("rcache")
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.root.join("jrnl")
    }

    pub fn journal_file(&self) -> PathBuf {
        self.journal_dir().join("rjournal.bin")
    }

    /// Path of the payload file for `key` (the key is the file name).
    pub fn payload_path(&self, key: &str) -> PathBuf {
        self.payload_dir().join(key)
    }
}

#[cfg(test)]
mod test {
    use super::Layout;

    #[test]
    fn derives_expected_paths() {
        let layout = Layout::new("/tmp/root");
        assert_eq!(layout.payload_dir(), std::path::Path::new("/tmp/root/rcache"));
        assert_eq!(layout.journal_dir(), std::path::Path::new("/tmp/root/jrnl"));
        assert_eq!(
            layout.journal_file(),
            std::path::Path::new("/tmp/root/jrnl/rjournal.bin")
        );
        assert_eq!(
            layout.payload_path("one"),
            std::path::Path::new("/tmp/root/rcache/one")
        );
    }
}
