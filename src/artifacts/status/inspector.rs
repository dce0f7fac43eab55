use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use derive_new::new;
use std::path::Path;

#[derive(new)]
pub struct Inspector<'r> {
    repository: &'r Repository,
}

impl<'r> Inspector<'r> {
    /// Whether an untracked path holds anything the index does not know about
    ///
    /// Empty directories count as untracked content.
    pub fn is_indirectly_tracked(&self, path: &Path, index: &Index) -> anyhow::Result<bool> {
        let workspace = self.repository.workspace();
        if !workspace.absolute(path).is_dir() || workspace.is_nested_repository(path) {
            return Ok(index.is_directly_tracked(path));
        }

        let children = workspace.list_dir(path)?;
        if children.is_empty() {
            return Ok(true);
        }

        for child in children {
            if self.is_indirectly_tracked(&child, index)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Hash of a working-directory leaf without storing it
    ///
    /// Nested repositories hash to the commit their HEAD points at.
    pub fn content_oid(&self, path: &Path, stat: &EntryMetadata) -> anyhow::Result<ObjectId> {
        let workspace = self.repository.workspace();
        if stat.mode.is_gitlink() {
            return Ok(workspace.nested_head(path)?.unwrap_or(ObjectId::NULL));
        }

        workspace.parse_blob(path)?.object_id()
    }

    fn is_content_changed(&self, index_entry: &IndexEntry, stat: &EntryMetadata) -> anyhow::Result<bool> {
        Ok(self.content_oid(&index_entry.name, stat)? != index_entry.oid)
    }

    pub fn check_index_against_workspace(
        &self,
        entry: Option<&IndexEntry>,
        stat: Option<&EntryMetadata>,
    ) -> anyhow::Result<WorkspaceChangeType> {
        match (entry, stat) {
            (None, _) => Ok(WorkspaceChangeType::Untracked),
            (Some(_), None) => Ok(WorkspaceChangeType::Deleted),
            (Some(entry), Some(stat)) if entry.mode().is_gitlink() || stat.mode.is_gitlink() => {
                if entry.mode() != stat.mode || self.is_content_changed(entry, stat)? {
                    Ok(WorkspaceChangeType::Modified)
                } else {
                    Ok(WorkspaceChangeType::None)
                }
            }
            (Some(entry), Some(stat)) if !entry.stat_match(stat) => {
                Ok(WorkspaceChangeType::Modified)
            }
            (Some(entry), Some(stat)) if entry.times_match(stat) => Ok(WorkspaceChangeType::None),
            (Some(entry), Some(stat)) if self.is_content_changed(entry, stat)? => {
                Ok(WorkspaceChangeType::Modified)
            }
            _ => Ok(WorkspaceChangeType::None),
        }
    }

    pub fn check_index_against_head_tree(
        &self,
        index_entry: Option<&IndexEntry>,
        head_entry: Option<&DatabaseEntry>,
    ) -> IndexChangeType {
        match (index_entry, head_entry) {
            (Some(index_entry), Some(head_entry))
                if head_entry.mode != index_entry.metadata.mode
                    || head_entry.oid != index_entry.oid =>
            {
                IndexChangeType::Modified
            }
            (Some(_), None) => IndexChangeType::Added,
            (None, Some(_)) => IndexChangeType::Deleted,
            _ => IndexChangeType::None,
        }
    }

    /// Whether anything would be lost by overwriting the working tree with `HEAD`
    ///
    /// Covers staged changes, unstaged edits and deletions, untracked files,
    /// and unresolved conflicts.
    pub fn has_uncommitted_changes(&self, index: &Index) -> anyhow::Result<bool> {
        if index.has_conflicts() {
            return Ok(true);
        }

        let head_tree = match self.repository.refs().read_head()? {
            Some(head) => self.repository.database().flatten_tree(&head)?,
            None => Default::default(),
        };

        let staged = index.resolved_entries().count() != head_tree.len()
            || index.resolved_entries().any(|entry| {
                self.check_index_against_head_tree(Some(entry), head_tree.get(&entry.name))
                    != IndexChangeType::None
            });
        if staged {
            return Ok(true);
        }

        let workspace = self.repository.workspace();
        let listing = workspace.list_working_directory()?;
        // a gitlink whose repository was never cloned is not a local change
        let expected = index
            .resolved_entries()
            .filter(|entry| !entry.mode().is_gitlink() || workspace.is_nested_repository(&entry.name))
            .count();
        if listing.len() != expected {
            return Ok(true);
        }
        for (path, stat) in &listing {
            let change = self.check_index_against_workspace(index.entry_by_path(path), Some(stat))?;
            if change != WorkspaceChangeType::None {
                tracing::debug!(path = %path.display(), change = change.label(), "uncommitted change");
                return Ok(true);
            }
        }

        Ok(false)
    }
}
