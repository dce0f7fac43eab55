//! Git index (staging area)
//!
//! The index tracks which content goes into the next commit. It is keyed by
//! `(path, stage)`: stage 0 holds resolved entries, stages 1-3 hold the base,
//! ours and theirs versions of a path left conflicted by a merge.
//!
//! ## Index File Format
//!
//! The index file contains:
//! - Header: Signature, version, and entry count
//! - Entries: sorted by path bytes, then stage
//! - Checksum: SHA-1 hash of the entire index for integrity verification
//!
//! ## Data Structures
//!
//! - `entries`: Maps `(path, stage)` to index entries
//! - `children`: Maps directory paths to the file paths below them, used to
//!   discard file/directory clashes when an entry is added

use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{
    ENTRY_BLOCK, ENTRY_MIN_SIZE, EntryMetadata, IndexEntry, Stage, path_key,
};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::HEADER_SIZE;
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

type EntryKey = (String, Stage);

/// Git index (staging area)
///
/// The index is persisted to disk and uses checksums for integrity verification.
#[derive(Debug, Clone)]
pub struct Index {
    /// Path to the index file (typically `.git/index`)
    path: Box<Path>,
    entries: BTreeMap<EntryKey, IndexEntry>,
    children: BTreeMap<String, BTreeSet<String>>,
    header: IndexHeader,
    /// Flag indicating if the index has been modified since loading
    changed: bool,
}

impl Index {
    /// Create a new empty index backed by `path`
    pub fn new(path: Box<Path>) -> Self {
        Index {
            path,
            entries: BTreeMap::new(),
            children: BTreeMap::new(),
            header: IndexHeader::with_entries(0),
            changed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Resolved (stage 0) entry at `path`
    pub fn entry_by_path(&self, path: &Path) -> Option<&IndexEntry> {
        self.entry_at(path, Stage::Resolved)
    }

    pub fn entry_at(&self, path: &Path, stage: Stage) -> Option<&IndexEntry> {
        self.entries.get(&(path_key(path), stage))
    }

    /// Every stage recorded for `path`, lowest stage first
    pub fn entries_at_path(&self, path: &Path) -> Vec<&IndexEntry> {
        let key = path_key(path);
        self.entries
            .range((key.clone(), Stage::Resolved)..=(key, Stage::Theirs))
            .map(|(_, entry)| entry)
            .collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.children.clear();
        self.header = IndexHeader::with_entries(0);
        self.changed = false;
    }

    /// Load the index from disk
    ///
    /// A missing or empty index file yields an empty index. The checksum
    /// trailer is verified after all entries are parsed.
    ///
    /// # Locking
    ///
    /// Acquires a shared lock on the index file during reading.
    pub fn rehydrate(&mut self) -> anyhow::Result<()> {
        self.clear();

        if !self.path().exists() {
            return Ok(());
        }

        let mut index_file = std::fs::OpenOptions::new()
            .read(true)
            .open(self.path())
            .with_context(|| format!("Unable to open index {}", self.path.display()))?;
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;

        if lock.deref_mut().metadata()?.len() == 0 {
            return Ok(());
        }

        let mut reader = Checksum::new(&mut *lock);
        let entries_count = Self::parse_header(&mut reader)?;
        for _ in 0..entries_count {
            let entry = Self::parse_entry(&mut reader)?;
            self.store_entry(entry);
        }
        reader.verify()?;

        self.header.entries_count = entries_count;
        self.changed = false;

        Ok(())
    }

    fn parse_header(reader: &mut Checksum<impl std::io::Read>) -> anyhow::Result<u32> {
        let header_bytes = reader.read(HEADER_SIZE)?;
        let header = IndexHeader::deserialize(std::io::Cursor::new(header_bytes))?;

        Ok(header.entries_count)
    }

    /// Read one entry, extending block by block until the NUL-padded name ends
    fn parse_entry(reader: &mut Checksum<impl std::io::Read>) -> anyhow::Result<IndexEntry> {
        let mut entry_bytes = reader.read(ENTRY_MIN_SIZE)?.to_vec();

        while entry_bytes[entry_bytes.len() - 1] != 0 {
            entry_bytes.extend_from_slice(&reader.read(ENTRY_BLOCK)?);
        }

        IndexEntry::deserialize(std::io::Cursor::new(Bytes::from(entry_bytes)))
    }

    /// Whether `path` is a tracked file (any stage) or a directory containing one
    pub fn is_directly_tracked(&self, path: &Path) -> bool {
        let key = path_key(path);
        self.children.contains_key(&key) || !self.entries_at_path(path).is_empty()
    }

    fn store_entry(&mut self, entry: IndexEntry) {
        let key = entry.key();
        for parent in entry.parent_dirs() {
            self.children
                .entry(path_key(parent))
                .or_default()
                .insert(key.0.clone());
        }

        self.entries.insert(key, entry);
    }

    /// Drop every stage of `path`, keeping the directory map in sync
    fn remove_entry(&mut self, path: &Path) {
        let removed = Stage::CONFLICT_STAGES
            .iter()
            .chain(std::iter::once(&Stage::Resolved))
            .filter_map(|stage| self.entries.remove(&(path_key(path), *stage)))
            .collect::<Vec<_>>();

        let Some(entry) = removed.first() else {
            return;
        };

        let key = path_key(path);
        for parent in entry.parent_dirs() {
            let parent = path_key(parent);
            if let Some(children) = self.children.get_mut(&parent) {
                children.remove(&key);
                if children.is_empty() {
                    self.children.remove(&parent);
                }
            }
        }
    }

    fn remove_children(&mut self, path: &Path) {
        if let Some(children) = self.children.get(&path_key(path)).cloned() {
            for child in children {
                self.remove_entry(Path::new(&child));
            }
        }
    }

    /// Remove entries that would clash with `entry` in a tree
    ///
    /// A file replaces any directory at its path and any file at one of its
    /// parent directories.
    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for parent in entry.parent_dirs() {
            self.remove_entry(parent);
        }
        self.remove_children(&entry.name);
    }

    /// Add or replace the resolved entry for a path
    ///
    /// Any conflict stages recorded for the same path are dropped.
    pub fn add(&mut self, entry: IndexEntry) {
        let entry = IndexEntry {
            stage: Stage::Resolved,
            ..entry
        };

        self.discard_conflicts(&entry);
        self.remove_entry(&entry.name);
        self.store_entry(entry);

        self.changed = true;
    }

    /// Replace whatever is recorded at `path` with conflict stages
    ///
    /// `versions` holds the base, ours and theirs sides; absent sides are
    /// simply not written. Entries below `path` are kept, so a file that
    /// clashes with a merged directory stays visible next to it.
    pub fn add_conflict(&mut self, path: &Path, versions: [Option<DatabaseEntry>; 3]) {
        self.remove_entry(path);

        for (stage, version) in Stage::CONFLICT_STAGES.into_iter().zip(versions) {
            if let Some(version) = version {
                self.store_entry(IndexEntry::from_database_entry(path.to_path_buf(), &version, stage));
            }
        }

        self.changed = true;
    }

    /// Delete every stage of `path`, or every entry below it if it is a directory
    pub fn remove(&mut self, path: &Path) {
        self.remove_entry(path);
        self.remove_children(path);

        self.changed = true;
    }

    /// Forget whatever is recorded at exactly `path`, leaving entries below it alone
    pub fn remove_stages(&mut self, path: &Path) {
        self.remove_entry(path);
        self.changed = true;
    }

    /// Replace all entries with the leaves of a tree, at stage 0
    pub fn read_from_tree(&mut self, database: &Database, tree_oid: &ObjectId) -> anyhow::Result<()> {
        let mut entries = Vec::new();
        for item in database.traverse(*tree_oid) {
            let (path, entry) = item?;
            if !entry.mode.is_tree() {
                entries.push(IndexEntry::from_database_entry(
                    path,
                    &entry.database_entry(),
                    Stage::Resolved,
                ));
            }
        }

        self.clear();
        for entry in entries {
            self.store_entry(entry);
        }
        self.changed = true;

        Ok(())
    }

    /// Persist the index, replacing the file on disk
    ///
    /// # Locking
    ///
    /// Holds an exclusive lock on the index file while writing.
    pub fn write_updates(&mut self) -> anyhow::Result<()> {
        let mut index_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.path())
            .with_context(|| format!("Unable to open index {}", self.path.display()))?;
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Exclusive, 0, 1)?;

        let mut writer = Checksum::new(&mut *lock);

        self.header = IndexHeader::with_entries(self.entries.len() as u32);
        writer.write(&self.header.serialize()?)?;

        for entry in self.entries.values() {
            writer.write(&entry.serialize()?)?;
        }

        writer.write_checksum()?;
        self.changed = false;

        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "wrote index");

        Ok(())
    }

    /// Refresh the cached stat of a resolved entry after its content was verified
    pub fn update_entry_stat(&mut self, path: &Path, stat: EntryMetadata) {
        if let Some(existing_entry) = self.entries.get_mut(&(path_key(path), Stage::Resolved)) {
            existing_entry.metadata = EntryMetadata {
                mode: existing_entry.metadata.mode,
                ..stat
            };
            self.changed = true;
        }
    }

    /// All entries in `(path, stage)` order
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Stage-0 entries in path order
    pub fn resolved_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values().filter(|entry| !entry.stage.is_conflict())
    }

    /// Distinct paths that still have stage 1-3 entries
    pub fn conflicts(&self) -> Vec<PathBuf> {
        self.entries
            .values()
            .filter(|entry| entry.stage.is_conflict())
            .map(|entry| entry.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.values().any(|entry| entry.stage.is_conflict())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked paths equal to or below `path`; `.` selects everything
    pub fn entries_under_path(&self, path: &Path) -> Vec<PathBuf> {
        self.entries
            .values()
            .filter(|entry| path == Path::new(".") || entry.name.starts_with(path))
            .map(|entry| entry.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Exclusive write access to the index
///
/// Holds `index.lock` (created exclusively) for its whole lifetime so that a
/// second writer fails fast instead of interleaving. Nothing reaches the
/// index file until [`IndexSession::commit`]; dropping a session discards
/// its changes.
#[derive(Debug)]
pub struct IndexSession {
    index: Index,
    lock_path: PathBuf,
}

impl IndexSession {
    pub fn begin(index_path: &Path) -> anyhow::Result<Self> {
        let lock_path = index_path.with_extension("lock");
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .with_context(|| {
                format!(
                    "Unable to create '{}': another process may be updating the index",
                    lock_path.display()
                )
            })?;

        let mut index = Index::new(index_path.into());
        if let Err(error) = index.rehydrate() {
            let _ = std::fs::remove_file(&lock_path);
            return Err(error);
        }

        Ok(IndexSession { index, lock_path })
    }

    /// Write pending changes and release the lock
    pub fn commit(mut self) -> anyhow::Result<()> {
        if self.index.is_changed() {
            self.index.write_updates()?;
        }
        Ok(())
    }
}

impl Deref for IndexSession {
    type Target = Index;

    fn deref(&self) -> &Self::Target {
        &self.index
    }
}

impl DerefMut for IndexSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.index
    }
}

impl Drop for IndexSession {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.lock_path) {
            tracing::warn!(path = %self.lock_path.display(), %error, "failed to release index lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::blob::Blob;
    use crate::artifacts::objects::object::Object;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn temp_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn entry(path: &str) -> IndexEntry {
        IndexEntry::new(
            PathBuf::from(path),
            Blob::from(path).object_id().unwrap(),
            EntryMetadata {
                mode: EntryMode::File(FileMode::Regular),
                ..Default::default()
            },
        )
    }

    fn names(index: &Index) -> Vec<String> {
        index
            .entries()
            .map(|entry| entry.name.to_string_lossy().into_owned())
            .collect()
    }

    #[rstest]
    fn add_a_single_file(temp_dir: TempDir) {
        let mut index = Index::new(temp_dir.path().join("index").into());
        index.add(entry("alice.txt"));

        assert_eq!(names(&index), vec!["alice.txt"]);
    }

    #[rstest]
    fn replace_a_file_with_a_directory(temp_dir: TempDir) {
        let mut index = Index::new(temp_dir.path().join("index").into());
        index.add(entry("alice.txt"));
        index.add(entry("bob.txt"));

        index.add(entry("alice.txt/nested.txt"));

        assert_eq!(names(&index), vec!["alice.txt/nested.txt", "bob.txt"]);
    }

    #[rstest]
    fn replace_a_directory_with_a_file(temp_dir: TempDir) {
        let mut index = Index::new(temp_dir.path().join("index").into());
        index.add(entry("alice.txt"));
        index.add(entry("nested/bob.txt"));
        index.add(entry("nested/inner/claire.txt"));

        index.add(entry("nested"));

        assert_eq!(names(&index), vec!["alice.txt", "nested"]);
    }

    #[rstest]
    fn entries_sort_by_raw_path_bytes(temp_dir: TempDir) {
        let mut index = Index::new(temp_dir.path().join("index").into());
        index.add(entry("a/b"));
        index.add(entry("a.txt"));
        index.add(entry("a-b"));

        assert_eq!(names(&index), vec!["a-b", "a.txt", "a/b"]);
    }

    #[rstest]
    fn conflict_stages_replace_the_resolved_entry(temp_dir: TempDir) {
        let mut index = Index::new(temp_dir.path().join("index").into());
        index.add(entry("f"));
        let ours = entry("ours").database_entry();
        let theirs = entry("theirs").database_entry();

        index.add_conflict(Path::new("f"), [None, Some(ours), Some(theirs)]);

        let stages = index
            .entries_at_path(Path::new("f"))
            .iter()
            .map(|entry| entry.stage)
            .collect::<Vec<_>>();
        assert_eq!(stages, vec![Stage::Ours, Stage::Theirs]);
        assert_eq!(index.conflicts(), vec![PathBuf::from("f")]);

        index.add(entry("f"));
        assert!(!index.has_conflicts());
    }

    #[rstest]
    fn index_round_trips_through_disk_with_stages(temp_dir: TempDir) {
        let index_path = temp_dir.path().join("index");
        let mut index = Index::new(index_path.clone().into());
        index.add(entry("dir/file.txt"));
        index.add(entry("a-really-long-file-name-to-cross-an-entry-block.txt"));
        index.add_conflict(
            Path::new("conflicted"),
            [
                Some(entry("base").database_entry()),
                Some(entry("ours").database_entry()),
                Some(entry("theirs").database_entry()),
            ],
        );
        index.write_updates().unwrap();

        let mut reloaded = Index::new(index_path.into());
        reloaded.rehydrate().unwrap();

        assert_eq!(
            reloaded.entries().cloned().collect::<Vec<_>>(),
            index.entries().cloned().collect::<Vec<_>>()
        );
    }

    #[rstest]
    fn corrupted_checksum_is_rejected(temp_dir: TempDir) {
        let index_path = temp_dir.path().join("index");
        let mut index = Index::new(index_path.clone().into());
        index.add(entry("file.txt"));
        index.write_updates().unwrap();

        let mut bytes = std::fs::read(&index_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&index_path, bytes).unwrap();

        let mut reloaded = Index::new(index_path.into());
        assert!(reloaded.rehydrate().is_err());
    }

    #[rstest]
    fn only_one_session_may_hold_the_index(temp_dir: TempDir) {
        let index_path = temp_dir.path().join("index");

        let session = IndexSession::begin(&index_path).unwrap();
        assert!(IndexSession::begin(&index_path).is_err());

        drop(session);
        assert!(IndexSession::begin(&index_path).is_ok());
    }

    #[rstest]
    fn dropped_session_discards_its_changes(temp_dir: TempDir) {
        let index_path = temp_dir.path().join("index");

        {
            let mut session = IndexSession::begin(&index_path).unwrap();
            session.add(entry("never-written.txt"));
        }

        let mut index = Index::new(index_path.into());
        index.rehydrate().unwrap();
        assert!(index.is_empty());
    }
}
