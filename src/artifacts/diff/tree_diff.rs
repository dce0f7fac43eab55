//! Tree-to-tree comparison
//!
//! Walks two trees side by side and only descends into subtrees whose ids
//! differ, so unchanged directories are never read. Leaves (blobs, symlinks,
//! gitlinks) are reported by full path; a path that is a directory on one
//! side and a leaf on the other is reported as a deletion plus the leaves
//! found below the directory.

use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use bitflags::bitflags;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

bitflags! {
    /// Change types to keep when listing differences
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct DiffFilter: u32 {
        const ADDED = 0b000001;
        const DELETED = 0b000010;
        const MODIFIED = 0b000100;
        const RENAMED = 0b001000;
        const TYPE_CHANGED = 0b010000;
        const UNMERGED = 0b100000;
    }
}

impl DiffFilter {
    /// Parse a `--diff-filter` style letter set such as `AMD`
    pub fn try_parse(s: &str) -> Option<Self> {
        let mut filter = Self::empty();

        for c in s.chars() {
            match c {
                'A' => filter |= Self::ADDED,
                'D' => filter |= Self::DELETED,
                'M' => filter |= Self::MODIFIED,
                'R' => filter |= Self::RENAMED,
                'T' => filter |= Self::TYPE_CHANGED,
                'U' => filter |= Self::UNMERGED,
                _ => return None,
            }
        }

        Some(filter)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeChangeType {
    Added(DatabaseEntry),
    Deleted(DatabaseEntry),
    Modified {
        old: DatabaseEntry,
        new: DatabaseEntry,
    },
}

impl TreeChangeType {
    pub fn from_entries(old: Option<DatabaseEntry>, new: Option<DatabaseEntry>) -> Option<Self> {
        match (old, new) {
            (None, Some(new)) => Some(TreeChangeType::Added(new)),
            (Some(old), None) => Some(TreeChangeType::Deleted(old)),
            (Some(old), Some(new)) if old != new => Some(TreeChangeType::Modified { old, new }),
            _ => None,
        }
    }

    pub fn old_entry(&self) -> Option<&DatabaseEntry> {
        match self {
            TreeChangeType::Deleted(entry) => Some(entry),
            TreeChangeType::Modified { old, .. } => Some(old),
            TreeChangeType::Added(_) => None,
        }
    }

    pub fn new_entry(&self) -> Option<&DatabaseEntry> {
        match self {
            TreeChangeType::Added(entry) => Some(entry),
            TreeChangeType::Modified { new, .. } => Some(new),
            TreeChangeType::Deleted(_) => None,
        }
    }
}

pub type ChangeSet = BTreeMap<PathBuf, TreeChangeType>;
type TreeEntryMap = BTreeMap<String, DatabaseEntry>;

#[derive(Debug)]
pub struct TreeDiff<'r> {
    database: &'r Database,
    change_set: ChangeSet,
}

impl<'r> TreeDiff<'r> {
    pub fn new(database: &'r Database) -> Self {
        TreeDiff {
            database,
            change_set: BTreeMap::new(),
        }
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.change_set
    }

    pub fn into_changes(self) -> ChangeSet {
        self.change_set
    }

    /// Compare two tree-ish ids (`None` is the empty tree)
    pub fn compare_oids(
        &mut self,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
        prefix: &Path,
    ) -> anyhow::Result<()> {
        if old == new {
            return Ok(());
        }

        let old_entries = self.tree_entries(old)?;
        let new_entries = self.tree_entries(new)?;

        self.detect_deletions(&old_entries, &new_entries, prefix)?;
        self.detect_additions(&old_entries, &new_entries, prefix)?;

        Ok(())
    }

    fn tree_entries(&self, oid: Option<&ObjectId>) -> anyhow::Result<TreeEntryMap> {
        let Some(oid) = oid else {
            return Ok(BTreeMap::new());
        };

        let tree_oid = self.database.peel_to_tree(oid)?;
        let handle = self.database.handle(tree_oid);
        let tree = handle
            .as_tree()
            .with_context(|| format!("Invalid tree object {tree_oid}"))?;

        Ok(tree
            .entries()
            .map(|entry| (entry.name.clone(), entry.database_entry()))
            .collect())
    }

    fn detect_deletions(
        &mut self,
        old: &TreeEntryMap,
        new: &TreeEntryMap,
        prefix: &Path,
    ) -> anyhow::Result<()> {
        for (name, entry) in old {
            let path = prefix.join(name);
            let other = new.get(name);

            if other == Some(entry) {
                continue;
            }

            let old_tree = entry.is_tree().then_some(&entry.oid);
            let new_tree = other.filter(|other| other.is_tree()).map(|other| &other.oid);
            self.compare_oids(old_tree, new_tree, &path)?;

            let old_leaf = (!entry.is_tree()).then_some(*entry);
            let new_leaf = other.filter(|other| !other.is_tree()).copied();

            if let Some(change_type) = TreeChangeType::from_entries(old_leaf, new_leaf) {
                self.change_set.insert(path, change_type);
            }
        }

        Ok(())
    }

    fn detect_additions(
        &mut self,
        old: &TreeEntryMap,
        new: &TreeEntryMap,
        prefix: &Path,
    ) -> anyhow::Result<()> {
        for (name, entry) in new {
            if old.contains_key(name) {
                continue;
            }

            let path = prefix.join(name);
            if entry.is_tree() {
                self.compare_oids(None, Some(&entry.oid), &path)?;
            } else {
                self.change_set.insert(path, TreeChangeType::Added(*entry));
            }
        }

        Ok(())
    }
}
