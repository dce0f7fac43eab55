use crate::areas::repository::Repository;
use crate::artifacts::core::error::RepositoryError;
use std::path::PathBuf;

impl Repository {
    /// Drop every stage of `paths` from the index, optionally deleting the files too
    ///
    /// A nested repository with local changes is never deleted.
    pub fn remove(&self, paths: &[PathBuf], delete_from_workspace: bool) -> anyhow::Result<()> {
        let mut session = self.index_session()?;
        let mut removed = Vec::new();

        for path in paths {
            let path = self.relative_path(path)?;
            let tracked = session.entries_under_path(&path);
            if tracked.is_empty() {
                return Err(RepositoryError::PathNotFound(path).into());
            }

            if delete_from_workspace {
                for file in &tracked {
                    if self.workspace().is_nested_repository(file) && self.nested(file)?.is_dirty()? {
                        return Err(RepositoryError::DirtyNestedRepository(file.clone()).into());
                    }
                }
            }

            for file in &tracked {
                session.remove(file);
            }
            removed.extend(tracked);
        }

        session.commit()?;

        for file in &removed {
            if delete_from_workspace {
                self.workspace().remove_path(file)?;
                self.workspace().prune_empty_parents(file)?;
            }
            writeln!(self.writer(), "rm '{}'", file.display())?;
        }

        Ok(())
    }
}
