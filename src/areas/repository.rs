use crate::areas::database::Database;
use crate::areas::index::{Index, IndexSession};
use crate::areas::refs::Refs;
use crate::areas::workspace::{GIT_DIR, Workspace};
use crate::artifacts::core::settings::Settings;
use crate::artifacts::status::inspector::Inspector;
use anyhow::Context;
use std::cell::{RefCell, RefMut};
use std::path::{Component, Path, PathBuf};

const INDEX_FILE: &str = "index";
const OBJECTS_DIR: &str = "objects";
const MERGE_HEAD_FILE: &str = "MERGE_HEAD";

/// Context every operation runs against
///
/// Owns the object store, the reference store and the working directory of
/// one repository, plus the settings it was opened with. The index is not
/// held here: mutations go through [`Repository::index_session`], reads
/// through [`Repository::load_index`].
pub struct Repository {
    path: Box<Path>,
    git_dir: Box<Path>,
    writer: RefCell<Box<dyn std::io::Write>>,
    database: Database,
    workspace: Workspace,
    refs: Refs,
    settings: Settings,
}

impl Repository {
    pub fn new(path: &Path, writer: Box<dyn std::io::Write>) -> anyhow::Result<Self> {
        Self::open(path, Settings::default(), writer)
    }

    pub fn open(
        path: &Path,
        settings: Settings,
        writer: Box<dyn std::io::Write>,
    ) -> anyhow::Result<Self> {
        if !path.exists() {
            std::fs::create_dir_all(path)
                .with_context(|| format!("Unable to create {}", path.display()))?;
        }
        let path = path
            .canonicalize()
            .with_context(|| format!("Unable to resolve {}", path.display()))?;
        let git_dir = path.join(GIT_DIR);

        Ok(Repository {
            database: Database::new(git_dir.join(OBJECTS_DIR).into_boxed_path()),
            workspace: Workspace::new(path.clone().into_boxed_path()),
            refs: Refs::new(git_dir.clone().into_boxed_path()),
            path: path.into_boxed_path(),
            git_dir: git_dir.into_boxed_path(),
            writer: RefCell::new(writer),
            settings,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn writer(&'_ self) -> RefMut<'_, Box<dyn std::io::Write>> {
        self.writer.borrow_mut()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index_path(&self) -> PathBuf {
        self.git_dir.join(INDEX_FILE)
    }

    pub fn merge_head_path(&self) -> PathBuf {
        self.git_dir.join(MERGE_HEAD_FILE)
    }

    /// Take the index for writing; fails while another session holds it
    pub fn index_session(&self) -> anyhow::Result<IndexSession> {
        IndexSession::begin(&self.index_path())
    }

    /// Read-only snapshot of the index
    pub fn load_index(&self) -> anyhow::Result<Index> {
        let mut index = Index::new(self.index_path().into_boxed_path());
        index.rehydrate()?;
        Ok(index)
    }

    /// Repository-relative form of a path given relative to the root or as
    /// an absolute path inside the working directory
    pub fn relative_path(&self, path: &Path) -> anyhow::Result<PathBuf> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.path).with_context(|| {
                format!(
                    "'{}' is outside repository at '{}'",
                    path.display(),
                    self.path.display()
                )
            })?
        } else {
            path
        };

        Ok(relative
            .components()
            .filter(|component| !matches!(component, Component::CurDir))
            .collect())
    }

    /// Open the repository nested at `path`, sharing this repository's settings
    pub fn nested(&self, path: &Path) -> anyhow::Result<Repository> {
        Repository::open(
            &self.path.join(path),
            self.settings.clone(),
            Box::new(std::io::sink()),
        )
    }

    /// Whether any staged, unstaged, untracked or conflicted change exists
    pub fn is_dirty(&self) -> anyhow::Result<bool> {
        Inspector::new(self).has_uncommitted_changes(&self.load_index()?)
    }
}
