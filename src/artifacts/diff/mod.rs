//! Change detection between trees, the index and the working directory
//!
//! - `endpoint`: the three comparison sources behind one [`Diffable`] interface
//! - `similarity`: line-based content similarity and rename pairing
//! - `tree_diff`: pruning tree-to-tree comparison
//!
//! Every comparison produces an ordered list of [`ChangeRecord`]s. Paths
//! with unresolved conflict stages on either side are reported as
//! [`ChangeType::Unmerged`] and take no part in the other classifications.

pub mod endpoint;
pub mod similarity;
pub mod tree_diff;

use crate::artifacts::core::settings::Settings;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::{DiffFilter, TreeChangeType};
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::path_key;
use crate::artifacts::objects::object_id::ObjectId;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One side of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffEndpoint {
    /// A tree, or anything that peels to one (commit, tag)
    Tree(ObjectId),
    Index,
    WorkingDirectory,
}

/// Leaves of an endpoint keyed by path, plus its conflicted paths
#[derive(Debug, Default, Clone)]
pub struct LeafSet {
    pub entries: BTreeMap<PathBuf, DatabaseEntry>,
    pub unmerged: BTreeSet<PathBuf>,
}

/// Anything that can stand on either side of a diff
pub trait Diffable {
    /// Hash of the tree this endpoint represents, when it can be known
    /// without reading the working directory
    fn tree_oid(&self) -> anyhow::Result<Option<ObjectId>>;

    fn leaf_entries(&self) -> anyhow::Result<LeafSet>;

    /// Content of one of this endpoint's leaves
    fn content(&self, path: &Path, entry: &DatabaseEntry) -> anyhow::Result<Bytes>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeType {
    Added,
    Deleted,
    Modified,
    Renamed,
    TypeChanged,
    Unmerged,
}

impl ChangeType {
    pub fn status_char(&self) -> char {
        match self {
            ChangeType::Added => 'A',
            ChangeType::Deleted => 'D',
            ChangeType::Modified => 'M',
            ChangeType::Renamed => 'R',
            ChangeType::TypeChanged => 'T',
            ChangeType::Unmerged => 'U',
        }
    }

    pub fn matches_filter(&self, filter: DiffFilter) -> bool {
        let flag = match self {
            ChangeType::Added => DiffFilter::ADDED,
            ChangeType::Deleted => DiffFilter::DELETED,
            ChangeType::Modified => DiffFilter::MODIFIED,
            ChangeType::Renamed => DiffFilter::RENAMED,
            ChangeType::TypeChanged => DiffFilter::TYPE_CHANGED,
            ChangeType::Unmerged => DiffFilter::UNMERGED,
        };
        filter.contains(flag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Path on the new side (the destination for renames)
    pub path: PathBuf,
    pub change_type: ChangeType,
    pub old_mode: Option<EntryMode>,
    pub new_mode: Option<EntryMode>,
    pub old_oid: Option<ObjectId>,
    pub new_oid: Option<ObjectId>,
    /// Similarity percentage, set for renames
    pub similarity: Option<u8>,
    /// Source path, set for renames
    pub old_path: Option<PathBuf>,
}

impl ChangeRecord {
    /// Classify a leaf present on at least one side; `None` when unchanged
    pub fn from_entries(
        path: PathBuf,
        old: Option<&DatabaseEntry>,
        new: Option<&DatabaseEntry>,
    ) -> Option<Self> {
        let change_type = match (old, new) {
            (None, None) => return None,
            (None, Some(_)) => ChangeType::Added,
            (Some(_), None) => ChangeType::Deleted,
            (Some(old), Some(new)) if old == new => return None,
            (Some(old), Some(new)) if old.mode.kind() != new.mode.kind() => {
                ChangeType::TypeChanged
            }
            (Some(_), Some(_)) => ChangeType::Modified,
        };

        Some(ChangeRecord {
            path,
            change_type,
            old_mode: old.map(|entry| entry.mode),
            new_mode: new.map(|entry| entry.mode),
            old_oid: old.map(|entry| entry.oid),
            new_oid: new.map(|entry| entry.oid),
            similarity: None,
            old_path: None,
        })
    }

    pub fn unmerged(path: PathBuf) -> Self {
        ChangeRecord {
            path,
            change_type: ChangeType::Unmerged,
            old_mode: None,
            new_mode: None,
            old_oid: None,
            new_oid: None,
            similarity: None,
            old_path: None,
        }
    }

    pub fn old_entry(&self) -> Option<DatabaseEntry> {
        Some(DatabaseEntry::new(self.old_oid?, self.old_mode?))
    }

    pub fn new_entry(&self) -> Option<DatabaseEntry> {
        Some(DatabaseEntry::new(self.new_oid?, self.new_mode?))
    }

    /// Path the record is reported under on the old side
    pub fn source_path(&self) -> &Path {
        self.old_path.as_deref().unwrap_or(&self.path)
    }

    /// `--name-status` style line
    pub fn name_status(&self) -> String {
        match (&self.old_path, self.similarity) {
            (Some(old_path), Some(similarity)) => format!(
                "{}{:03}\t{}\t{}",
                self.change_type.status_char(),
                similarity,
                old_path.display(),
                self.path.display()
            ),
            _ => format!("{}\t{}", self.change_type.status_char(), self.path.display()),
        }
    }
}

/// Compare two endpoints leaf by leaf
pub fn compare(
    settings: &Settings,
    old: &dyn Diffable,
    new: &dyn Diffable,
) -> anyhow::Result<Vec<ChangeRecord>> {
    if let (Some(old_tree), Some(new_tree)) = (old.tree_oid()?, new.tree_oid()?)
        && old_tree == new_tree
    {
        return Ok(Vec::new());
    }

    let old_leaves = old.leaf_entries()?;
    let new_leaves = new.leaf_entries()?;

    let unmerged = old_leaves
        .unmerged
        .union(&new_leaves.unmerged)
        .cloned()
        .collect::<BTreeSet<_>>();
    let paths = old_leaves
        .entries
        .keys()
        .chain(new_leaves.entries.keys())
        .filter(|path| !unmerged.contains(*path))
        .cloned()
        .collect::<BTreeSet<_>>();

    let records = paths
        .into_iter()
        .filter_map(|path| {
            let old_entry = old_leaves.entries.get(&path);
            let new_entry = new_leaves.entries.get(&path);
            ChangeRecord::from_entries(path, old_entry, new_entry)
        })
        .chain(unmerged.into_iter().map(ChangeRecord::unmerged))
        .collect::<Vec<_>>();

    finish(settings, records, old, new)
}

/// Turn a pruned tree diff into change records
pub fn from_tree_changes(
    settings: &Settings,
    changes: impl IntoIterator<Item = (PathBuf, TreeChangeType)>,
    old: &dyn Diffable,
    new: &dyn Diffable,
) -> anyhow::Result<Vec<ChangeRecord>> {
    let records = changes
        .into_iter()
        .filter_map(|(path, change)| {
            ChangeRecord::from_entries(path, change.old_entry(), change.new_entry())
        })
        .collect();

    finish(settings, records, old, new)
}

fn finish(
    settings: &Settings,
    records: Vec<ChangeRecord>,
    old: &dyn Diffable,
    new: &dyn Diffable,
) -> anyhow::Result<Vec<ChangeRecord>> {
    let mut records = if settings.detect_renames {
        similarity::detect_renames(records, old, new, settings.rename_threshold)?
    } else {
        records
    };

    records.sort_by_cached_key(|record| path_key(&record.path));
    Ok(records)
}
