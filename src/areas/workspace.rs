//! Working directory access
//!
//! Enumerates the files of a checkout with their stat metadata, reads and
//! writes file content, and applies checkout migrations. A directory holding
//! its own `.git` is a nested repository: it is listed as a single gitlink
//! entry and never descended into.

use crate::areas::refs::Refs;
use crate::artifacts::checkout::migration::{ActionType, Migration};
use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::index::index_entry::{EntryMetadata, path_key};
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use bytes::Bytes;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const GIT_DIR: &str = ".git";

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn absolute(&self, path: &Path) -> PathBuf {
        self.path.join(path)
    }

    /// Whether `path` (relative) is the root of a nested repository
    pub fn is_nested_repository(&self, path: &Path) -> bool {
        !path.as_os_str().is_empty() && self.path.join(path).join(GIT_DIR).exists()
    }

    /// Every leaf of the working directory with its stat, in path byte order
    ///
    /// Leaves are regular files, symlinks and nested repositories. Nothing
    /// below `.git` is listed.
    pub fn list_working_directory(&self) -> anyhow::Result<Vec<(PathBuf, EntryMetadata)>> {
        self.list_leaves(&self.path)
    }

    /// Leaves at or below `root` (relative to the workspace)
    pub fn list_files(&self, root: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let absolute = self.path.join(root);
        let metadata = std::fs::symlink_metadata(&absolute)
            .with_context(|| format!("The specified path does not exist: {}", root.display()))?;

        if metadata.is_dir() && !self.is_nested_repository(root) {
            Ok(self
                .list_leaves(&absolute)?
                .into_iter()
                .map(|(path, _)| path)
                .collect())
        } else {
            Ok(vec![root.to_path_buf()])
        }
    }

    fn list_leaves(&self, root: &Path) -> anyhow::Result<Vec<(PathBuf, EntryMetadata)>> {
        let mut leaves = Vec::new();
        let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry?;
            let file_type = entry.file_type();

            if entry.file_name() == GIT_DIR {
                if file_type.is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            }

            let relative = entry.path().strip_prefix(self.path.as_ref())?.to_path_buf();
            if file_type.is_dir() {
                if self.is_nested_repository(&relative) {
                    walker.skip_current_dir();
                    leaves.push((relative, Self::gitlink_metadata()));
                }
                continue;
            }

            let stat = self.stat_file(&relative)?;
            leaves.push((relative, stat));
        }

        leaves.sort_by_cached_key(|(path, _)| path_key(path));
        Ok(leaves)
    }

    /// Immediate children of a directory, excluding `.git`
    pub fn list_dir(&self, dir_path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let absolute = self.path.join(dir_path);
        if !absolute.is_dir() {
            anyhow::bail!("The specified path is not a directory: {}", dir_path.display());
        }

        let mut children = std::fs::read_dir(&absolute)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name() != GIT_DIR)
            .map(|entry| dir_path.join(entry.file_name()))
            .collect::<Vec<_>>();
        children.sort();

        Ok(children)
    }

    fn gitlink_metadata() -> EntryMetadata {
        EntryMetadata {
            mode: EntryMode::Gitlink,
            ..Default::default()
        }
    }

    pub fn stat_file(&self, file_path: &Path) -> anyhow::Result<EntryMetadata> {
        if self.is_nested_repository(file_path) {
            return Ok(Self::gitlink_metadata());
        }

        let absolute = self.path.join(file_path);
        let metadata = std::fs::symlink_metadata(&absolute)
            .with_context(|| format!("Unable to stat {}", file_path.display()))?;

        (absolute.as_path(), metadata).try_into()
    }

    /// Raw content: file bytes, or the link target for symlinks
    pub fn read_file(&self, file_path: &Path) -> anyhow::Result<Bytes> {
        let absolute = self.path.join(file_path);
        let metadata = std::fs::symlink_metadata(&absolute)
            .with_context(|| format!("Unable to stat {}", file_path.display()))?;

        if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(&absolute)
                .with_context(|| format!("Unable to read link {}", file_path.display()))?;
            return Ok(Bytes::copy_from_slice(target.as_os_str().as_bytes()));
        }

        let content = std::fs::read(&absolute)
            .with_context(|| format!("Unable to read {}", file_path.display()))?;
        Ok(content.into())
    }

    pub fn parse_blob(&self, file_path: &Path) -> anyhow::Result<Blob> {
        Ok(Blob::new(self.read_file(file_path)?))
    }

    /// Commit checked out in the nested repository at `path`, if any
    pub fn nested_head(&self, path: &Path) -> anyhow::Result<Option<ObjectId>> {
        Refs::new(self.path.join(path).join(GIT_DIR).into()).read_head()
    }

    /// Write content at `file_path` with permissions matching `mode`
    pub fn write_file(&self, file_path: &Path, data: &[u8], mode: EntryMode) -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let absolute = self.path.join(file_path);
        if let Some(parent) = absolute.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent of {}", file_path.display()))?;
        }
        self.remove_path(file_path)?;

        match mode {
            EntryMode::Symlink => {
                let target = std::ffi::OsStr::from_bytes(data);
                std::os::unix::fs::symlink(target, &absolute)
                    .with_context(|| format!("Failed to create symlink {}", file_path.display()))?;
            }
            EntryMode::Gitlink | EntryMode::Directory => {
                std::fs::create_dir_all(&absolute)
                    .with_context(|| format!("Failed to create {}", file_path.display()))?;
            }
            EntryMode::File(file_mode) => {
                std::fs::write(&absolute, data)
                    .with_context(|| format!("Failed to write to file: {}", file_path.display()))?;
                let permissions = match file_mode {
                    FileMode::Regular => 0o644,
                    FileMode::Executable => 0o755,
                };
                std::fs::set_permissions(&absolute, std::fs::Permissions::from_mode(permissions))
                    .with_context(|| {
                        format!("Failed to set permissions for file: {}", file_path.display())
                    })?;
            }
        }

        Ok(())
    }

    /// Remove a file, symlink or directory tree; missing paths are ignored
    pub fn remove_path(&self, file_path: &Path) -> anyhow::Result<()> {
        let absolute = self.path.join(file_path);
        let Ok(metadata) = std::fs::symlink_metadata(&absolute) else {
            return Ok(());
        };

        if metadata.is_dir() {
            std::fs::remove_dir_all(&absolute)
                .with_context(|| format!("Failed to remove directory: {}", file_path.display()))?;
        } else {
            std::fs::remove_file(&absolute)
                .with_context(|| format!("Failed to remove file: {}", file_path.display()))?;
        }

        Ok(())
    }

    /// Remove now-empty parent directories of `file_path`, innermost first
    pub fn prune_empty_parents(&self, file_path: &Path) -> anyhow::Result<()> {
        for parent in file_path.ancestors().skip(1) {
            if parent.as_os_str().is_empty() {
                break;
            }
            let absolute = self.path.join(parent);
            let is_empty = std::fs::read_dir(&absolute)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty {
                break;
            }
            std::fs::remove_dir(&absolute)?;
        }
        Ok(())
    }

    // Deletions run first, then stale directories are pruned bottom-up;
    // additions create their parents top-down before files are written.
    pub fn apply_migration(&self, migration: &Migration) -> anyhow::Result<()> {
        self.apply_migration_action_set(migration, ActionType::Delete)?;

        for dir_path in migration.rmdirs().iter().rev() {
            let absolute = self.path.join(dir_path);
            if let Ok(mut entries) = std::fs::read_dir(&absolute)
                && entries.next().is_none()
            {
                std::fs::remove_dir(&absolute)?;
            }
        }

        for dir_path in migration.mkdirs() {
            let absolute = self.path.join(dir_path);
            if absolute.is_file() || absolute.is_symlink() {
                std::fs::remove_file(&absolute)?;
            }
            std::fs::create_dir_all(&absolute)?;
        }

        self.apply_migration_action_set(migration, ActionType::Modify)?;
        self.apply_migration_action_set(migration, ActionType::Add)?;

        Ok(())
    }

    fn apply_migration_action_set(
        &self,
        migration: &Migration,
        action: ActionType,
    ) -> anyhow::Result<()> {
        for (file_path, entry) in migration.actions_of(action) {
            match (action, entry) {
                (ActionType::Delete, _) => {
                    // a nested checkout is handled by submodule update, only
                    // its empty placeholder is removed here
                    if self.is_nested_repository(file_path) {
                        continue;
                    }
                    self.remove_path(file_path)?;
                }
                (ActionType::Add | ActionType::Modify, Some(entry)) => {
                    if entry.is_gitlink() {
                        if !self.absolute(file_path).is_dir() {
                            self.write_file(file_path, &[], entry.mode)?;
                        }
                        continue;
                    }
                    let data = migration.load_blob_data(&entry.oid)?;
                    self.write_file(file_path, &data, entry.mode)?;
                }
                _ => anyhow::bail!("Invalid action and entry combination"),
            }
        }

        Ok(())
    }
}
