//! One nested repository as recorded by a parent commit
//!
//! A descriptor starts out knowing only what the gitlink says: where the
//! nested repository lives and which commit it should be at. Everything that
//! comes from `.gitmodules` (name, url, branch) depends on the parent commit
//! the configuration is read from, so it is only available once the
//! descriptor has been bound to one.

use crate::areas::repository::Repository;
use crate::artifacts::core::error::RepositoryError;
use crate::artifacts::core::settings::Settings;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::submodule::config::{SubmoduleConfig, SubmoduleSection};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    parent_commit: ObjectId,
    section: SubmoduleSection,
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleDescriptor {
    path: PathBuf,
    commit: ObjectId,
    binding: Option<Binding>,
}

impl SubmoduleDescriptor {
    /// Unbound descriptor for the gitlink at `path` pointing at `commit`
    pub fn from_gitlink(path: PathBuf, commit: ObjectId) -> Self {
        SubmoduleDescriptor {
            path,
            commit,
            binding: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Commit the parent records for this submodule
    pub fn commit(&self) -> &ObjectId {
        &self.commit
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn parent_commit(&self) -> Option<&ObjectId> {
        self.binding.as_ref().map(|binding| &binding.parent_commit)
    }

    /// Bind to `parent_commit`, reading its `.gitmodules`
    pub fn bind(self, repository: &Repository, parent_commit: &ObjectId) -> anyhow::Result<Self> {
        let config = SubmoduleConfig::at_commit(repository.database(), parent_commit)?;
        self.bind_with(&config, repository.path(), parent_commit)
    }

    /// Bind against an already parsed configuration
    ///
    /// `root` is the parent's working directory; relative urls and
    /// [`SubmoduleDescriptor::abspath`] resolve against it.
    pub fn bind_with(
        self,
        config: &SubmoduleConfig,
        root: &Path,
        parent_commit: &ObjectId,
    ) -> anyhow::Result<Self> {
        let section = config.by_path(&self.path).cloned().ok_or_else(|| {
            RepositoryError::InconsistentSubmoduleConfig {
                path: self.path.clone(),
                reason: "the tree records a gitlink that no .gitmodules section lists".into(),
            }
        })?;

        Ok(SubmoduleDescriptor {
            binding: Some(Binding {
                parent_commit: *parent_commit,
                section,
                root: root.to_path_buf(),
            }),
            ..self
        })
    }

    fn binding(&self) -> Result<&Binding, RepositoryError> {
        self.binding
            .as_ref()
            .ok_or_else(|| RepositoryError::UnboundParentContext(self.path.clone()))
    }

    pub fn name(&self) -> anyhow::Result<&str> {
        Ok(&self.binding()?.section.name)
    }

    /// Url to fetch from, with `./` and `../` forms made absolute against the parent's root
    pub fn url(&self) -> anyhow::Result<String> {
        let binding = self.binding()?;
        let url = &binding.section.url;

        if url.starts_with("./") || url.starts_with("../") {
            Ok(normalize(&binding.root.join(url)).to_string_lossy().into_owned())
        } else {
            Ok(url.clone())
        }
    }

    pub fn branch(&self) -> anyhow::Result<Option<&str>> {
        Ok(self.binding()?.section.branch.as_deref())
    }

    pub fn abspath(&self) -> anyhow::Result<PathBuf> {
        Ok(self.binding()?.root.join(&self.path))
    }

    /// Whether the nested repository has been cloned into place
    pub fn is_checked_out(&self) -> anyhow::Result<bool> {
        Ok(self.abspath()?.join(crate::areas::workspace::GIT_DIR).exists())
    }

    /// Open the nested repository; it must already be checked out
    pub fn module(&self, settings: &Settings) -> anyhow::Result<Repository> {
        let abspath = self.abspath()?;
        if !self.is_checked_out()? {
            anyhow::bail!("submodule '{}' is not checked out", self.path.display());
        }
        Repository::open(&abspath, settings.clone(), Box::new(std::io::sink()))
    }
}

/// Resolve `.` and `..` components without touching the file system
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}
