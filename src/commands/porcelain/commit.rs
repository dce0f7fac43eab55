use crate::areas::repository::Repository;
use crate::artifacts::core::error::RepositoryError;
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;

const MERGE_MSG_FILE: &str = "MERGE_MSG";

impl Repository {
    /// Record the index as a new commit and advance HEAD
    ///
    /// Without explicit `parents` the commit follows HEAD, plus `MERGE_HEAD`
    /// when a conflicted merge is being concluded.
    pub fn commit(&self, message: &str, parents: Option<Vec<ObjectId>>) -> anyhow::Result<ObjectId> {
        let session = self.index_session()?;
        if session.has_conflicts() {
            return Err(RepositoryError::DirtyMergeState(session.conflicts().len()).into());
        }

        let tree_oid = self.write_tree_from(&session)?;
        let parents = match parents {
            Some(parents) => parents,
            None => self.pending_parents()?,
        };

        let author = match &self.settings().author {
            Some(author) => author.clone(),
            None => Author::load_from_env()?,
        };
        let commit = Commit::new(parents, tree_oid, author, message.trim().to_string());
        let commit_oid = self.database().store(&commit)?;
        self.refs().update_head(commit_oid)?;

        self.clear_merge_state()?;
        drop(session);

        let is_root = if commit.parents().is_empty() { "(root-commit) " } else { "" };
        tracing::info!(commit = %commit_oid, tree = %tree_oid, parents = commit.parents().len(), "created commit");
        writeln!(
            self.writer(),
            "[{}{}] {}",
            is_root,
            commit_oid.to_short_oid(),
            commit.short_message()
        )?;

        Ok(commit_oid)
    }

    /// HEAD followed by the commit being merged in, if any
    fn pending_parents(&self) -> anyhow::Result<Vec<ObjectId>> {
        let mut parents = self.refs().read_head()?.into_iter().collect::<Vec<_>>();

        let merge_head = self.merge_head_path();
        if merge_head.is_file() {
            let raw = std::fs::read_to_string(&merge_head)
                .with_context(|| format!("Unable to read {}", merge_head.display()))?;
            parents.push(ObjectId::try_parse(raw.trim())?);
        }

        Ok(parents)
    }

    pub(crate) fn merge_message_path(&self) -> std::path::PathBuf {
        self.git_dir().join(MERGE_MSG_FILE)
    }

    pub(crate) fn clear_merge_state(&self) -> anyhow::Result<()> {
        for path in [self.merge_head_path(), self.merge_message_path()] {
            if path.is_file() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Unable to remove {}", path.display()))?;
            }
        }
        Ok(())
    }
}
