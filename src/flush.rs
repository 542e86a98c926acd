//! Drains dirty entries to the payload store through the journal, then
//! trims the disk tier to its size budget.
use crate::{entry::EntryState, error::Result, index::LruIndex, journal::Journal, store::PayloadStore};

/// Walks the index once (order does not matter; journaling makes each
/// entry's persistence atomic) and brings every non-`Synced` entry to disk.
pub fn run(journal: &Journal, store: &PayloadStore, index: &mut LruIndex) -> Result<()> {
    let mut to_remove = Vec::new();

    for entry in index.iter_mut() {
        match entry.state {
            EntryState::Updated => {
                let uuid = journal.begin_write(&entry.key)?;
                store.write(&entry.key, &entry.bytes)?;
                journal.commit(&uuid)?;
                entry.state = EntryState::Synced;
            }
            EntryState::Deleted => {
                let uuid = journal.begin_delete(&entry.key)?;
                store.delete(&entry.key)?;
                journal.commit(&uuid)?;
                to_remove.push(entry.key.clone());
            }
            EntryState::Accessed => {
                store.set_mtime(&entry.key, entry.last_accessed)?;
                entry.state = EntryState::Synced;
            }
            EntryState::Synced => {}
        }
    }

    for key in to_remove {
        index.remove(&key);
    }

    Ok(())
}

/// Enforces the on-disk size budget: deletes the oldest (by mtime) payload
/// files not currently tracked in the index until the total is within
/// `max_disk`. Never deletes a file whose key is live in the index: that
/// is the hot set the client is actively using.
pub fn purge_oldest_entries(store: &PayloadStore, index: &LruIndex, max_disk: u64) -> Result<()> {
    let mut files = store.list()?;
    let mut total: u64 = files.iter().map(|f| f.size).sum();
    if total <= max_disk {
        return Ok(());
    }

    files.sort_by(|a, b| a.mtime.cmp(&b.mtime));

    for file in files {
        if total <= max_disk {
            break;
        }
        if index.contains(&file.key) {
            continue;
        }
        store.delete(&file.key)?;
        total = total.saturating_sub(file.size);
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        entry::CacheEntry,
        fs::test::{InMemoryFilesystem, ManualClock},
        layout::Layout,
    };
    use std::{sync::Arc, time::SystemTime};

    fn rig() -> (Journal, PayloadStore, LruIndex) {
        let fs = Arc::new(InMemoryFilesystem::new());
        let layout = Layout::new("/root");
        let journal = Journal::new(layout.clone(), fs.clone(), Arc::new(ManualClock::default()));
        journal.reset().unwrap();
        let store = PayloadStore::new(layout, fs);
        (journal, store, LruIndex::new())
    }

    #[test]
    fn updated_entry_is_persisted_and_synced() {
        let (journal, store, mut index) = rig();
        index.put(CacheEntry::new(
            "k",
            b"v".to_vec(),
            EntryState::Updated,
            SystemTime::now(),
        ));

        run(&journal, &store, &mut index).unwrap();

        assert_eq!(store.read("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(index.peek("k").unwrap().state, EntryState::Synced);
    }

    #[test]
    fn deleted_entry_is_removed_from_disk_and_index() {
        let (journal, store, mut index) = rig();
        store.write("k", b"v").unwrap();
        index.put(CacheEntry::new(
            "k",
            Vec::new(),
            EntryState::Deleted,
            SystemTime::now(),
        ));

        run(&journal, &store, &mut index).unwrap();

        assert_eq!(store.read("k").unwrap(), None);
        assert!(!index.contains("k"));
    }

    #[test]
    fn accessed_entry_refreshes_mtime_and_becomes_synced() {
        let (journal, store, mut index) = rig();
        store.write("k", b"v").unwrap();
        let stamp = SystemTime::now() + std::time::Duration::from_secs(10);
        index.put(CacheEntry::new("k", b"v".to_vec(), EntryState::Accessed, stamp));

        run(&journal, &store, &mut index).unwrap();

        assert_eq!(index.peek("k").unwrap().state, EntryState::Synced);
        let mtime = store.list().unwrap()[0].mtime;
        assert_eq!(mtime, stamp);
    }

    #[test]
    fn trimmer_never_deletes_a_key_live_in_the_index() {
        let (_journal, store, mut index) = rig();
        store.write("hot", b"1").unwrap();
        store.write("cold", b"2").unwrap();
        index.put(CacheEntry::new("hot", b"1".to_vec(), EntryState::Synced, SystemTime::now()));

        purge_oldest_entries(&store, &index, 0).unwrap();

        assert!(store.read("hot").unwrap().is_some());
        assert!(store.read("cold").unwrap().is_none());
    }

    #[test]
    fn trimmer_is_noop_under_budget() {
        let (_journal, store, index) = rig();
        store.write("a", &[0u8; 10]).unwrap();
        purge_oldest_entries(&store, &index, 1024).unwrap();
        assert!(store.read("a").unwrap().is_some());
    }
}
