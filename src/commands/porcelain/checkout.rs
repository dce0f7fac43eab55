use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::checkout::migration::Migration;
use crate::artifacts::diff::tree_diff::TreeDiff;
use crate::artifacts::objects::object_id::ObjectId;
use std::path::Path;

impl Repository {
    /// Check out `target` (any commit-ish)
    ///
    /// With `branch`, that branch is pointed at the commit and HEAD follows
    /// it; otherwise HEAD is detached. Local changes the move would destroy
    /// abort the checkout unless `force` is set.
    pub fn checkout(&self, target: &ObjectId, branch: Option<&str>, force: bool) -> anyhow::Result<()> {
        let commit_oid = self.database().peel_to_commit(target)?;

        let mut session = self.index_session()?;
        self.migrate_to(&mut session, &commit_oid, force)?;
        session.commit()?;

        match branch {
            Some(branch) => {
                let ref_name = format!("refs/heads/{branch}");
                self.refs().update_ref(&ref_name, commit_oid)?;
                self.refs().set_head_symbolic(&ref_name)?;
            }
            None => self.refs().detach_head(commit_oid)?,
        }

        tracing::info!(commit = %commit_oid, branch = branch.unwrap_or("HEAD"), "checked out");
        Ok(())
    }

    /// Move the working tree and `index` from HEAD's tree to `target`'s
    pub(crate) fn migrate_to(&self, index: &mut Index, target: &ObjectId, force: bool) -> anyhow::Result<()> {
        let head = self.refs().read_head()?;

        let mut tree_diff = TreeDiff::new(self.database());
        tree_diff.compare_oids(head.as_ref(), Some(target), Path::new(""))?;

        let mut migration = Migration::new(self, index, tree_diff, force);
        migration.apply_changes()
    }
}
