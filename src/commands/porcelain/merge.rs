use crate::areas::index::IndexSession;
use crate::areas::repository::Repository;
use crate::artifacts::core::error::RepositoryError;
use crate::artifacts::index::index_entry::{IndexEntry, Stage};
use crate::artifacts::merge::ancestry::merge_base;
use crate::artifacts::merge::three_way::{MergeResult, merge_trees};
use crate::artifacts::merge::{ConflictSide, MergeOutcome};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree_builder::TreeBuilder;
use anyhow::Context;
use std::path::Path;

impl Repository {
    /// Merge the commit named by `revision` into HEAD
    ///
    /// Clean merges are committed with `message`. Conflicts are recorded in
    /// the index at stages 1-3 while the working tree keeps our version of
    /// the conflicted paths; the merge is concluded by resolving them and
    /// committing.
    pub fn merge(&self, revision: &str, message: &str) -> anyhow::Result<MergeOutcome> {
        let mut session = self.index_session()?;
        if session.has_conflicts() {
            return Err(RepositoryError::DirtyMergeState(session.conflicts().len()).into());
        }
        if self.merge_head_path().exists() {
            anyhow::bail!("a merge is already in progress; commit it before merging again");
        }

        let target = self.refs().resolve_name(revision, self.database())?;
        let target = self.database().peel_to_commit(&target)?;

        let Some(head) = self.refs().read_head()? else {
            return self.fast_forward(session, target);
        };

        let base = merge_base(self.database(), &head, &target)?;
        tracing::info!(head = %head, target = %target, base = ?base, "merging");

        if base == Some(target) {
            writeln!(self.writer(), "Already up to date.")?;
            return Ok(MergeOutcome::UpToDate);
        }
        if base == Some(head) {
            return self.fast_forward(session, target);
        }

        let result = merge_trees(self.database(), base.as_ref(), &head, &target)?;
        let merged_tree = self.store_merged_tree(&result)?;

        self.migrate_to(&mut session, &merged_tree, false)?;
        for conflict in &result.conflicts {
            session.add_conflict(&conflict.path, conflict.versions());
        }
        session.commit()?;

        if result.is_clean() {
            let commit = self.commit(message, Some(vec![head, target]))?;
            return Ok(MergeOutcome::Merged { commit, base });
        }

        std::fs::write(self.merge_head_path(), format!("{target}\n"))
            .context("Unable to write MERGE_HEAD")?;
        std::fs::write(self.merge_message_path(), format!("{}\n", message.trim()))
            .context("Unable to write MERGE_MSG")?;

        for conflict in &result.conflicts {
            writeln!(
                self.writer(),
                "CONFLICT ({}): Merge conflict in {}",
                conflict.kind.label(),
                conflict.path.display()
            )?;
        }
        writeln!(
            self.writer(),
            "Automatic merge failed; fix conflicts and then commit the result."
        )?;

        Ok(MergeOutcome::Conflicted {
            base,
            conflicts: result.conflicts,
        })
    }

    fn fast_forward(
        &self,
        mut session: IndexSession,
        target: ObjectId,
    ) -> anyhow::Result<MergeOutcome> {
        self.migrate_to(&mut session, &target, false)?;
        session.commit()?;
        self.refs().update_head(target)?;

        tracing::info!(commit = %target, "fast-forward");
        writeln!(self.writer(), "Fast-forward to {}", target.to_short_oid())?;

        Ok(MergeOutcome::FastForward(target))
    }

    /// Tree the working directory is moved to: every cleanly merged path,
    /// plus our side of each conflict unless something merged sits below it
    fn store_merged_tree(&self, result: &MergeResult) -> anyhow::Result<ObjectId> {
        let mut builder = TreeBuilder::new();
        let resolved = result.index.resolved_entries().collect::<Vec<_>>();

        for entry in &resolved {
            builder.insert(&entry.name, entry.mode(), entry.oid)?;
        }

        for conflict in &result.conflicts {
            let Some(ours) = conflict.ours else {
                continue;
            };
            let shadowed = resolved
                .iter()
                .map(|entry| entry.name.as_path())
                .chain(result.conflicts.iter().map(|other| other.path.as_path()))
                .any(|path| path != conflict.path && path.starts_with(&conflict.path));
            if !shadowed {
                builder.insert(&conflict.path, ours.mode, ours.oid)?;
            }
        }

        builder.finish(|tree| self.database().store(tree))
    }

    /// Settle a conflicted path on one of its recorded versions
    ///
    /// Choosing a side that was absent deletes the path.
    pub fn resolve(&self, path: &Path, side: ConflictSide) -> anyhow::Result<()> {
        let path = self.relative_path(path)?;
        let mut session = self.index_session()?;

        let conflicted = session
            .entries_at_path(&path)
            .iter()
            .any(|entry| entry.stage.is_conflict());
        if !conflicted {
            anyhow::bail!("'{}' has no unresolved conflict", path.display());
        }

        let chosen = session
            .entry_at(&path, side.stage())
            .map(IndexEntry::database_entry);
        match chosen {
            Some(entry) if entry.is_gitlink() => {
                session.add(IndexEntry::from_database_entry(path.clone(), &entry, Stage::Resolved));
            }
            Some(entry) => {
                let (_, data) = self.database().get(&entry.oid)?;
                self.workspace().write_file(&path, &data, entry.mode)?;

                let mut stat = self.workspace().stat_file(&path)?;
                stat.mode = entry.mode;
                session.add(IndexEntry::new(path.clone(), entry.oid, stat));
            }
            None => {
                session.remove_stages(&path);
                if !self.workspace().absolute(&path).is_dir() {
                    self.workspace().remove_path(&path)?;
                    self.workspace().prune_empty_parents(&path)?;
                }
            }
        }

        session.commit()?;
        tracing::info!(path = %path.display(), side = ?side, "resolved conflict");
        Ok(())
    }
}
