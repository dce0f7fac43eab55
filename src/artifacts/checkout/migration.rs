//! Moving the working tree and index from one tree to another
//!
//! A migration is planned from a [`TreeDiff`] between the tree currently
//! checked out and the target tree:
//!
//! 1. every changed path is checked against the index and the working
//!    directory for local state the move would destroy
//! 2. file system actions and the directories to create or prune are recorded
//! 3. unless forced, any conflict aborts before anything is touched
//! 4. the workspace and then the index are updated
//!
//! Gitlinks only get an empty placeholder directory here; populating and
//! removing nested checkouts is the job of submodule update.

use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::checkout::conflict::ConflictType;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::{TreeChangeType, TreeDiff};
use crate::artifacts::index::index_entry::{IndexEntry, Stage};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use crate::artifacts::status::inspector::Inspector;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Type of file system action required for checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionType {
    Add,
    Delete,
    Modify,
}

pub type ActionsSet = BTreeMap<ActionType, Vec<(PathBuf, Option<DatabaseEntry>)>>;

pub type ConflictsSet = BTreeMap<ConflictType, Vec<PathBuf>>;

pub struct Migration<'r> {
    repository: &'r Repository,
    tree_diff: TreeDiff<'r>,
    index: &'r mut Index,
    inspector: Inspector<'r>,
    force: bool,
    actions: ActionsSet,
    conflicts: ConflictsSet,
    mkdirs: BTreeSet<PathBuf>,
    rmdirs: BTreeSet<PathBuf>,
}

impl<'r> Migration<'r> {
    pub fn new(
        repository: &'r Repository,
        index: &'r mut Index,
        tree_diff: TreeDiff<'r>,
        force: bool,
    ) -> Self {
        Self {
            repository,
            tree_diff,
            index,
            inspector: Inspector::new(repository),
            force,
            actions: BTreeMap::new(),
            conflicts: BTreeMap::new(),
            mkdirs: BTreeSet::new(),
            rmdirs: BTreeSet::new(),
        }
    }

    pub fn actions_of(&self, action: ActionType) -> &[(PathBuf, Option<DatabaseEntry>)] {
        self.actions.get(&action).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn mkdirs(&self) -> &BTreeSet<PathBuf> {
        &self.mkdirs
    }

    pub fn rmdirs(&self) -> &BTreeSet<PathBuf> {
        &self.rmdirs
    }

    pub fn conflicts(&self) -> &ConflictsSet {
        &self.conflicts
    }

    pub fn apply_changes(&mut self) -> anyhow::Result<()> {
        self.plan_changes()?;
        self.repository.workspace().apply_migration(self)?;
        self.update_index()?;

        tracing::debug!(
            added = self.actions_of(ActionType::Add).len(),
            modified = self.actions_of(ActionType::Modify).len(),
            deleted = self.actions_of(ActionType::Delete).len(),
            "applied checkout migration"
        );
        Ok(())
    }

    fn plan_changes(&mut self) -> anyhow::Result<()> {
        let changes = self
            .tree_diff
            .changes()
            .iter()
            .map(|(path, change)| (path.clone(), change.clone()))
            .collect::<Vec<_>>();

        for (path, change) in &changes {
            if !self.force {
                self.check_for_conflict(path, change)?;
            }
            self.record_change(path, change);
        }

        if !self.conflicts.is_empty() {
            let errors = self
                .conflicts
                .iter()
                .map(|(conflict_type, paths)| {
                    let paths = paths
                        .iter()
                        .map(|path| format!("\t{}", path.display()))
                        .collect::<Vec<_>>()
                        .join("\n");
                    format!("error: {}:\n{}", conflict_type.description(), paths)
                })
                .collect::<Vec<_>>()
                .join("\n");
            anyhow::bail!("{errors}\nAborting");
        }

        Ok(())
    }

    fn check_for_conflict(&mut self, path: &Path, change: &TreeChangeType) -> anyhow::Result<()> {
        let entry = self.index.entry_by_path(path);
        let (old_entry, new_entry) = (change.old_entry(), change.new_entry());

        if self.index_differs_from_trees(entry, old_entry, new_entry) {
            self.conflicts
                .entry(ConflictType::StaleFile)
                .or_default()
                .push(path.into());
            return Ok(());
        }

        let workspace = self.repository.workspace();
        let stat = workspace.stat_file(path).ok();
        let conflict_type = ConflictType::classify(stat.as_ref(), entry, new_entry);

        let conflicted = match &stat {
            Some(stat) if stat.mode.is_tree() => self.inspector.is_indirectly_tracked(path, self.index)?,
            Some(stat) => {
                self.inspector.check_index_against_workspace(entry, Some(stat))?
                    != WorkspaceChangeType::None
            }
            None => {
                if let Some(parent) = self.untracked_parent(path)? {
                    let reported = if entry.is_some() { path.to_path_buf() } else { parent };
                    self.conflicts.entry(conflict_type).or_default().push(reported);
                }
                false
            }
        };

        if conflicted {
            self.conflicts
                .entry(conflict_type)
                .or_default()
                .push(path.into());
        }

        Ok(())
    }

    /// Closest ancestor that is an untracked file sitting where a directory must go
    fn untracked_parent(&self, path: &Path) -> anyhow::Result<Option<PathBuf>> {
        let workspace = self.repository.workspace();
        for parent in path.ancestors().skip(1) {
            if parent.as_os_str().is_empty() {
                break;
            }
            match workspace.stat_file(parent) {
                Ok(stat) if !stat.mode.is_tree() && !self.index.is_directly_tracked(parent) => {
                    return Ok(Some(parent.to_path_buf()));
                }
                _ => continue,
            }
        }
        Ok(None)
    }

    fn index_differs_from_trees(
        &self,
        index_entry: Option<&IndexEntry>,
        old_entry: Option<&DatabaseEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> bool {
        self.inspector.check_index_against_head_tree(index_entry, old_entry) != IndexChangeType::None
            && self.inspector.check_index_against_head_tree(index_entry, new_entry)
                != IndexChangeType::None
    }

    fn record_change(&mut self, path: &Path, change: &TreeChangeType) {
        let parents = path
            .ancestors()
            .skip(1)
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .map(Path::to_path_buf);

        let action = match change {
            TreeChangeType::Added(_) => {
                self.mkdirs.extend(parents);
                ActionType::Add
            }
            TreeChangeType::Deleted(_) => {
                self.rmdirs.extend(parents);
                ActionType::Delete
            }
            TreeChangeType::Modified { .. } => {
                self.mkdirs.extend(parents);
                ActionType::Modify
            }
        };

        self.actions
            .entry(action)
            .or_default()
            .push((path.into(), change.new_entry().copied()));
    }

    fn update_index(&mut self) -> anyhow::Result<()> {
        let deletions = self.actions_of(ActionType::Delete).to_vec();
        for (path, _) in deletions {
            self.index.remove(&path);
        }

        let updates = [ActionType::Add, ActionType::Modify]
            .into_iter()
            .flat_map(|action| self.actions_of(action).to_vec())
            .collect::<Vec<_>>();
        for (path, entry) in updates {
            let entry = entry
                .ok_or_else(|| anyhow::anyhow!("Entry must be provided for Add and Modify actions"))?;

            if entry.is_gitlink() {
                self.index
                    .add(IndexEntry::from_database_entry(path, &entry, Stage::Resolved));
                continue;
            }

            let stat = self.repository.workspace().stat_file(&path)?;
            let mut index_entry = IndexEntry::new(path, entry.oid, stat);
            index_entry.metadata.mode = entry.mode;
            self.index.add(index_entry);
        }

        Ok(())
    }

    pub fn load_blob_data(&self, object_id: &ObjectId) -> anyhow::Result<Bytes> {
        let (_, payload) = self.repository.database().get(object_id)?;
        Ok(payload)
    }
}
