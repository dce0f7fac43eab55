//! Materializing nested repositories
//!
//! A fetch makes the objects and branches of a source repository available
//! in a destination repository, creating the destination if needed. Source
//! branches land under `refs/remotes/origin/`; the destination's own
//! branches and working tree are left alone.

use crate::areas::refs::{HEAD_REF_NAME, Refs};
use crate::areas::repository::Repository;
use crate::areas::workspace::GIT_DIR;
use crate::artifacts::core::settings::Settings;
use anyhow::Context;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const REMOTE_PREFIX: &str = "refs/remotes/origin";

pub trait ModuleFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> anyhow::Result<()>;
}

/// Fetches from repositories on the local file system (`/path`, `file:///path`)
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFetcher;

impl LocalFetcher {
    fn source_git_dir(url: &str) -> anyhow::Result<PathBuf> {
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));

        if path.join(GIT_DIR).is_dir() {
            Ok(path.join(GIT_DIR))
        } else if path.join("objects").is_dir() && path.join(HEAD_REF_NAME).is_file() {
            Ok(path.to_path_buf())
        } else {
            anyhow::bail!("'{url}' is not a local repository")
        }
    }

    /// Copy loose objects the destination lacks; returns how many were copied
    fn copy_objects(source: &Path, destination: &Path) -> anyhow::Result<usize> {
        let mut copied = 0;

        for entry in WalkDir::new(source).min_depth(2).max_depth(2) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(source)?;
            let target = destination.join(relative);
            if target.exists() {
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }

            // objects are immutable, so sharing the inode is fine
            if std::fs::hard_link(entry.path(), &target).is_err() {
                std::fs::copy(entry.path(), &target)
                    .with_context(|| format!("Unable to copy object {}", relative.display()))?;
            }
            copied += 1;
        }

        Ok(copied)
    }
}

impl ModuleFetcher for LocalFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> anyhow::Result<()> {
        let source_dir = Self::source_git_dir(url)?;
        let target = Repository::open(destination, Settings::default(), Box::new(std::io::sink()))?;
        target.init()?;

        let copied = Self::copy_objects(&source_dir.join("objects"), target.database().objects_path())?;

        let source_refs = Refs::new(source_dir.into_boxed_path());
        for (name, oid) in source_refs.list_refs("refs/heads")? {
            let branch = name.trim_start_matches("refs/heads/");
            target.refs().update_ref(&format!("{REMOTE_PREFIX}/{branch}"), oid)?;
        }
        if let Some(branch) = source_refs.current_ref()?.strip_prefix("refs/heads/") {
            target
                .refs()
                .set_symbolic_ref(&format!("{REMOTE_PREFIX}/HEAD"), &format!("{REMOTE_PREFIX}/{branch}"))?;
        }

        tracing::info!(url, destination = %destination.display(), objects = copied, "fetched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::blob::Blob;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;

    #[test]
    fn fetch_copies_objects_and_tracks_branches() {
        let temp = TempDir::new().unwrap();
        let source = Repository::new(&temp.path().join("source"), Box::new(std::io::sink())).unwrap();
        source.init().unwrap();
        let oid = source.database().store(&Blob::from("payload")).unwrap();
        source.refs().update_ref("refs/heads/master", oid).unwrap();

        let destination = temp.path().join("destination");
        let url = format!("file://{}", source.path().display());
        LocalFetcher.fetch(&url, &destination).unwrap();
        // a second fetch finds nothing new
        LocalFetcher.fetch(&url, &destination).unwrap();

        let fetched = Repository::new(&destination, Box::new(std::io::sink())).unwrap();
        assert!(fetched.database().exists(&oid));
        assert_eq!(fetched.refs().read_ref("refs/remotes/origin/master").unwrap(), Some(oid));
        assert_eq!(fetched.refs().read_ref("refs/remotes/origin/HEAD").unwrap(), Some(oid));
        assert_eq!(fetched.refs().read_head().unwrap(), None);
    }

    #[test]
    fn non_repositories_are_rejected() {
        let temp = TempDir::new().unwrap();

        let result = LocalFetcher.fetch(
            &temp.path().display().to_string(),
            &temp.path().join("destination"),
        );

        assert!(result.is_err());
    }
}
