use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::core::error::RepositoryError;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use anyhow::Context;
use std::path::{Path, PathBuf};

impl Repository {
    /// Stage the content of `paths`
    ///
    /// Directories are expanded to their leaves. A path missing on disk is
    /// unstaged if it was tracked and rejected otherwise. Nothing is written
    /// unless every path could be staged.
    pub fn add(&self, paths: &[PathBuf]) -> anyhow::Result<()> {
        let mut session = self.index_session()?;

        for path in paths {
            let path = self.relative_path(path)?;
            let absolute = self.workspace().absolute(&path);

            if std::fs::symlink_metadata(&absolute).is_err() {
                let tracked = session.entries_under_path(&path);
                if tracked.is_empty() {
                    return Err(RepositoryError::PathNotFound(path).into());
                }
                tracing::debug!(path = %path.display(), "unstaging missing path");
                session.remove(&path);
                continue;
            }

            self.drop_vanished_entries(&mut session, &path)?;
            for file in self.workspace().list_files(&path)? {
                let stat = self.workspace().stat_file(&file)?;
                self.stage_file(&mut session, file, stat)?;
            }
        }

        session.commit()
    }

    fn stage_file(&self, index: &mut Index, file: PathBuf, stat: EntryMetadata) -> anyhow::Result<()> {
        let oid = if stat.mode.is_gitlink() {
            self.workspace()
                .nested_head(&file)?
                .with_context(|| format!("nested repository '{}' has no commit checked out", file.display()))?
        } else {
            let blob = self.workspace().parse_blob(&file)?;
            self.database().store(&blob)?
        };

        index.add(IndexEntry::new(file, oid, stat));
        Ok(())
    }

    /// Unstage tracked files below `path` that no longer exist on disk
    fn drop_vanished_entries(&self, index: &mut Index, path: &Path) -> anyhow::Result<()> {
        for tracked in index.entries_under_path(path) {
            if std::fs::symlink_metadata(self.workspace().absolute(&tracked)).is_err() {
                index.remove(&tracked);
            }
        }
        Ok(())
    }
}
