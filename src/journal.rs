//! Append-only text journal of write/delete intents and their commits.
//!
//! The file begins with the literal header `R2D2v1.0`; every record after
//! it is a `\n`-prefixed, space-separated line: `W: <uuid> <key> <instant>`,
//! `D: <uuid> <key> <instant>`, or `C: <uuid>`.
use crate::{
    error::Result,
    fs::{Clock, Filesystem},
    layout::Layout,
    store::PayloadStore,
};
use std::{collections::HashMap, sync::Arc};
use tracing::warn;
use uuid::Uuid;

pub const HEADER: &str = "R2D2v1.0";

#[derive(Clone)]
pub struct Journal {
    layout: Layout,
    fs: Arc<dyn Filesystem>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, PartialEq, Eq)]
enum Record {
    Write { uuid: String, key: String },
    Delete { uuid: String, key: String },
    Commit { uuid: String },
}

fn parse(line: &str) -> Option<Record> {
    let mut fields = line.split(' ');
    match fields.next()? {
        "W:" => Some(Record::Write {
            uuid: fields.next()?.to_owned(),
            key: fields.next()?.to_owned(),
        }),
        "D:" => Some(Record::Delete {
            uuid: fields.next()?.to_owned(),
            key: fields.next()?.to_owned(),
        }),
        "C:" => Some(Record::Commit {
            uuid: fields.next()?.to_owned(),
        }),
        _ => None,
    }
}

impl Journal {
    pub fn new(layout: Layout, fs: Arc<dyn Filesystem>, clock: Arc<dyn Clock>) -> Self {
        Self { layout, fs, clock }
    }

    pub fn exists(&self) -> bool {
        self.fs.read(&self.layout.journal_file()).is_ok()
    }

    fn append(&self, record: String) -> Result<()> {
        let path = self.layout.journal_file();
        let mut content = match self.fs.read(&path) {
            Ok(bytes) => bytes,
            Err(_) => HEADER.as_bytes().to_vec(),
        };
        content.push(b'\n');
        content.extend_from_slice(record.as_bytes());
        self.fs.write(&path, &content)?;
        Ok(())
    }

    pub fn begin_write(&self, key: &str) -> Result<String> {
        let uuid = Uuid::new_v4().to_string();
        let now = chrono::DateTime::<chrono::Utc>::from(self.clock.now()).to_rfc3339();
        self.append(format!("W: {uuid} {key} {now}"))?;
        Ok(uuid)
    }

    pub fn begin_delete(&self, key: &str) -> Result<String> {
        let uuid = Uuid::new_v4().to_string();
        let now = chrono::DateTime::<chrono::Utc>::from(self.clock.now()).to_rfc3339();
        self.append(format!("D: {uuid} {key} {now}"))?;
        Ok(uuid)
    }

    pub fn commit(&self, uuid: &str) -> Result<()> {
        self.append(format!("C: {uuid}"))
    }

    /// All raw lines after the header, in file order.
    pub fn read_all(&self) -> Result<Vec<String>> {
        let path = self.layout.journal_file();
        let content = match self.fs.read(&path) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(Vec::new()),
        };
        let text = String::from_utf8_lossy(&content);
        let rest = text.strip_prefix(HEADER).unwrap_or(&text);
        Ok(rest
            .split('\n')
            .map(str::to_owned)
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// Deletes the journal file (if present) and writes a fresh one
    /// containing only the header.
    pub fn reset(&self) -> Result<()> {
        let path = self.layout.journal_file();
        self.fs.create_dir_all(&self.layout.journal_dir())?;
        self.fs.remove_file(&path)?;
        self.fs.write(&path, HEADER.as_bytes())?;
        Ok(())
    }
}

/// Runs recovery once at open, only called when [`Journal::exists`] is true.
///
/// Scans the whole journal first to build the set of uncommitted intents,
/// *then* deletes their partial payload files, so a commit record appearing
/// later in the file can never be raced past mid-scan.
pub fn recover(journal: &Journal, store: &PayloadStore) -> Result<Vec<String>> {
    let lines = match journal.read_all() {
        Ok(lines) => lines,
        Err(e) => {
            warn!("journal unreadable, starting fresh: {e}");
            return Ok(Vec::new());
        }
    };

    let mut pending: HashMap<String, String> = HashMap::new();
    for line in &lines {
        match parse(line) {
            Some(Record::Write { uuid, key }) | Some(Record::Delete { uuid, key }) => {
                pending.insert(uuid, key);
            }
            Some(Record::Commit { uuid }) => {
                pending.remove(&uuid);
            }
            None => warn!("skipping malformed journal line: {line:?}"),
        }
    }

    let mut removed = Vec::new();
    for key in pending.into_values() {
        if store.delete(&key).is_ok() {
            removed.push(key);
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fs::test::{InMemoryFilesystem, ManualClock};

    fn journal() -> Journal {
        Journal::new(
            Layout::new("/root"),
            Arc::new(InMemoryFilesystem::new()),
            Arc::new(ManualClock::default()),
        )
    }

    #[test]
    fn fresh_journal_has_only_header() {
        let j = journal();
        j.reset().unwrap();
        assert!(j.read_all().unwrap().is_empty());
    }

    #[test]
    fn append_and_read_back() {
        let j = journal();
        j.reset().unwrap();
        let uuid = j.begin_write("k1").unwrap();
        j.commit(&uuid).unwrap();

        let lines = j.read_all().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(&format!("W: {uuid} k1")));
        assert_eq!(lines[1], format!("C: {uuid}"));
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert_eq!(parse("garbage"), None);
        assert_eq!(parse("W: only-uuid"), None);
        assert_eq!(
            parse("C: abc"),
            Some(Record::Commit {
                uuid: "abc".into()
            })
        );
    }

    #[test]
    fn recovery_removes_uncommitted_write_but_not_committed() {
        let fs = Arc::new(InMemoryFilesystem::new());
        let layout = Layout::new("/root");
        let j = Journal::new(layout.clone(), fs.clone(), Arc::new(ManualClock::default()));
        j.reset().unwrap();

        let store = PayloadStore::new(layout, fs);
        store.write("done", b"ok").unwrap();
        store.write("partial", b"oops").unwrap();

        let uuid_done = j.begin_write("done").unwrap();
        j.commit(&uuid_done).unwrap();
        let _uuid_partial = j.begin_write("partial").unwrap();

        let removed = recover(&j, &store).unwrap();
        assert_eq!(removed, vec!["partial".to_string()]);
        assert!(store.read("done").unwrap().is_some());
        assert!(store.read("partial").unwrap().is_none());
    }

    #[test]
    fn recovery_is_idempotent() {
        let fs = Arc::new(InMemoryFilesystem::new());
        let layout = Layout::new("/root");
        let j = Journal::new(layout.clone(), fs.clone(), Arc::new(ManualClock::default()));
        j.reset().unwrap();
        let store = PayloadStore::new(layout, fs);
        store.write("partial", b"oops").unwrap();
        let _uuid = j.begin_write("partial").unwrap();

        let first = recover(&j, &store).unwrap();
        let second = recover(&j, &store).unwrap();
        assert_eq!(first, vec!["partial".to_string()]);
        assert!(second.is_empty() || second == first);
    }
}
