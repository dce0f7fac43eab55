use crate::areas::repository::Repository;
use crate::artifacts::diff::endpoint::{IndexEndpoint, TreeEndpoint, WorkingDirectoryEndpoint};
use crate::artifacts::diff::tree_diff::TreeDiff;
use crate::artifacts::diff::{ChangeRecord, DiffEndpoint, Diffable, compare, from_tree_changes};
use crate::artifacts::index::index_entry::EntryMetadata;
use std::path::{Path, PathBuf};

impl Repository {
    /// Changes needed to turn `old` into `new`; `None` stands for the working directory
    pub fn diff(
        &self,
        old: Option<DiffEndpoint>,
        new: Option<DiffEndpoint>,
    ) -> anyhow::Result<Vec<ChangeRecord>> {
        let old = old.unwrap_or(DiffEndpoint::WorkingDirectory);
        let new = new.unwrap_or(DiffEndpoint::WorkingDirectory);
        if old == new {
            return Ok(Vec::new());
        }

        // two stored trees: prune identical subtrees instead of flattening both
        if let (DiffEndpoint::Tree(old_oid), DiffEndpoint::Tree(new_oid)) = (old, new) {
            let old_tree = TreeEndpoint::new(self.database(), &old_oid)?;
            let new_tree = TreeEndpoint::new(self.database(), &new_oid)?;

            let mut tree_diff = TreeDiff::new(self.database());
            tree_diff.compare_oids(Some(old_tree.oid()), Some(new_tree.oid()), Path::new(""))?;

            return from_tree_changes(self.settings(), tree_diff.into_changes(), &old_tree, &new_tree);
        }

        let index = self.load_index()?;
        let index_endpoint = IndexEndpoint::new(self.database(), &index);
        let worktree = WorkingDirectoryEndpoint::new(self, &index);
        let old_tree = match old {
            DiffEndpoint::Tree(oid) => Some(TreeEndpoint::new(self.database(), &oid)?),
            _ => None,
        };
        let new_tree = match new {
            DiffEndpoint::Tree(oid) => Some(TreeEndpoint::new(self.database(), &oid)?),
            _ => None,
        };

        let records = compare(
            self.settings(),
            select(old, old_tree.as_ref(), &index_endpoint, &worktree)?,
            select(new, new_tree.as_ref(), &index_endpoint, &worktree)?,
        )?;

        self.refresh_stale_stats(worktree.into_stale_stats());

        Ok(records)
    }

    /// Cache the stat of files that were rehashed but found unchanged
    ///
    /// Best effort: a busy index just means the files get hashed again next time.
    fn refresh_stale_stats(&self, stale: Vec<(PathBuf, EntryMetadata)>) {
        if stale.is_empty() {
            return;
        }

        let result = self.index_session().and_then(|mut session| {
            for (path, stat) in stale {
                session.update_entry_stat(&path, stat);
            }
            session.commit()
        });

        match result {
            Ok(()) => tracing::debug!("refreshed cached stat information"),
            Err(error) => tracing::warn!(%error, "could not refresh cached stat information"),
        }
    }
}

fn select<'a>(
    endpoint: DiffEndpoint,
    tree: Option<&'a TreeEndpoint<'a>>,
    index: &'a IndexEndpoint<'a>,
    worktree: &'a WorkingDirectoryEndpoint<'a>,
) -> anyhow::Result<&'a dyn Diffable> {
    match (endpoint, tree) {
        (DiffEndpoint::Tree(_), Some(tree)) => Ok(tree),
        (DiffEndpoint::Index, _) => Ok(index),
        (DiffEndpoint::WorkingDirectory, _) => Ok(worktree),
        (DiffEndpoint::Tree(oid), None) => anyhow::bail!("tree {oid} was not loaded"),
    }
}
