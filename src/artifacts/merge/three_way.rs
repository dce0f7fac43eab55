//! Three-way tree merge
//!
//! Every path found in the base, ours or theirs tree is resolved on its own,
//! with "absent" counting as a version:
//!
//! | ours vs theirs | ours vs base | theirs vs base | result   |
//! |----------------|--------------|----------------|----------|
//! | equal          |              |                | ours     |
//! | different      | equal        |                | theirs   |
//! | different      |              | equal          | ours     |
//! | different      | different    | different      | conflict |
//!
//! A conflicted path gets stages 1-3 (absent sides omitted) instead of a
//! stage-0 entry. A cleanly merged file that ends up where the other side
//! put a directory is also reported as a conflict. Renames are not tracked.

use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{IndexEntry, Stage};
use crate::artifacts::objects::object_id::ObjectId;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// Both sides changed the content differently
    Content,
    /// One side deleted what the other changed
    ModifyDelete,
    /// Both sides added different content at a new path
    AddAdd,
    /// A file where the merged result has a directory
    FileDirectory,
}

impl ConflictKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConflictKind::Content => "content",
            ConflictKind::ModifyDelete => "modify/delete",
            ConflictKind::AddAdd => "add/add",
            ConflictKind::FileDirectory => "file/directory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub path: PathBuf,
    pub kind: ConflictKind,
    pub base: Option<DatabaseEntry>,
    pub ours: Option<DatabaseEntry>,
    pub theirs: Option<DatabaseEntry>,
}

impl MergeConflict {
    pub fn versions(&self) -> [Option<DatabaseEntry>; 3] {
        [self.base, self.ours, self.theirs]
    }
}

#[derive(Debug, Clone)]
pub struct MergeResult {
    /// Merged entries, conflicts at stages 1-3
    pub index: Index,
    pub conflicts: Vec<MergeConflict>,
}

impl MergeResult {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

type Versions = [Option<DatabaseEntry>; 3];

/// Merge `ours` and `theirs` against `base` (`None` merges unrelated histories)
pub fn merge_trees(
    database: &Database,
    base: Option<&ObjectId>,
    ours: &ObjectId,
    theirs: &ObjectId,
) -> anyhow::Result<MergeResult> {
    let base_leaves = match base {
        Some(base) => database.flatten_tree(base)?,
        None => BTreeMap::new(),
    };
    let ours_leaves = database.flatten_tree(ours)?;
    let theirs_leaves = database.flatten_tree(theirs)?;

    let paths = base_leaves
        .keys()
        .chain(ours_leaves.keys())
        .chain(theirs_leaves.keys())
        .cloned()
        .collect::<BTreeSet<_>>();

    let mut clean: BTreeMap<PathBuf, (DatabaseEntry, Versions)> = BTreeMap::new();
    let mut conflicts: Vec<MergeConflict> = Vec::new();

    for path in paths {
        let versions = [
            base_leaves.get(&path).copied(),
            ours_leaves.get(&path).copied(),
            theirs_leaves.get(&path).copied(),
        ];

        match resolve(versions) {
            Ok(Some(entry)) => {
                clean.insert(path, (entry, versions));
            }
            Ok(None) => {}
            Err(kind) => conflicts.push(conflict(path, kind, versions)),
        }
    }

    let conflicted = conflicts
        .iter()
        .map(|conflict| conflict.path.clone())
        .collect::<Vec<_>>();
    for path in file_directory_clashes(&clean, &conflicted) {
        if let Some((_, versions)) = clean.remove(&path) {
            conflicts.push(conflict(path, ConflictKind::FileDirectory, versions));
        }
    }
    conflicts.sort_by(|a, b| a.path.cmp(&b.path));

    let mut index = Index::new(Path::new("").into());
    for (path, (entry, _)) in clean {
        index.add(IndexEntry::from_database_entry(path, &entry, Stage::Resolved));
    }
    for conflict in &conflicts {
        tracing::info!(path = %conflict.path.display(), kind = conflict.kind.label(), "merge conflict");
        index.add_conflict(&conflict.path, conflict.versions());
    }

    Ok(MergeResult { index, conflicts })
}

fn resolve([base, ours, theirs]: Versions) -> Result<Option<DatabaseEntry>, ConflictKind> {
    if ours == theirs {
        Ok(ours)
    } else if ours == base {
        Ok(theirs)
    } else if theirs == base {
        Ok(ours)
    } else if ours.is_none() || theirs.is_none() {
        Err(ConflictKind::ModifyDelete)
    } else if base.is_none() {
        Err(ConflictKind::AddAdd)
    } else {
        Err(ConflictKind::Content)
    }
}

fn conflict(path: PathBuf, kind: ConflictKind, [base, ours, theirs]: Versions) -> MergeConflict {
    MergeConflict {
        path,
        kind,
        base,
        ours,
        theirs,
    }
}

/// Cleanly merged files that are also a parent directory of another merged
/// or conflicted path
fn file_directory_clashes(
    clean: &BTreeMap<PathBuf, (DatabaseEntry, Versions)>,
    conflicted: &[PathBuf],
) -> BTreeSet<PathBuf> {
    clean
        .keys()
        .chain(conflicted)
        .flat_map(|path| path.ancestors().skip(1))
        .filter(|ancestor| !ancestor.as_os_str().is_empty() && clean.contains_key(*ancestor))
        .map(Path::to_path_buf)
        .collect()
}
