//! Git references (HEAD, branches, tags, remote-tracking refs)
//!
//! References are human-readable names pointing to objects. They can be:
//! - Direct: containing a 40-character object id
//! - Symbolic: `ref: <path>` pointing to another reference
//!
//! Besides reading and writing ref files, this module resolves revision
//! expressions to object ids, the one naming service the engine relies on.

use crate::areas::database::Database;
use crate::artifacts::core::error::RepositoryError;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::revision::Revision;
use anyhow::Context;
use derive_new::new;
use file_guard::Lock;
use std::io::Write;
use std::ops::DerefMut;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Regex pattern for parsing symbolic references
const SYMREF_REGEX: &str = r"^ref: (.+)$";

/// Name of the HEAD reference
pub const HEAD_REF_NAME: &str = "HEAD";

/// Branch HEAD points at in a fresh repository
pub const DEFAULT_BRANCH: &str = "master";

/// Directories searched, in order, when resolving a short ref name
const REF_SEARCH_PREFIXES: [&str; 4] = ["", "refs", "refs/heads", "refs/tags"];

/// Remote-tracking namespace searched last
const REMOTES_PREFIX: &str = "refs/remotes";

#[derive(Debug, Clone, PartialEq, Eq)]
enum RefValue {
    Symbolic(String),
    Direct(ObjectId),
}

impl RefValue {
    fn read(path: &Path) -> anyhow::Result<Option<RefValue>> {
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ref file at {}", path.display()))?;
        let content = content.trim();

        if content.is_empty() {
            return Ok(None);
        }

        if let Some(symref_match) = regex::Regex::new(SYMREF_REGEX)?.captures(content) {
            Ok(Some(RefValue::Symbolic(symref_match[1].to_string())))
        } else {
            Ok(Some(RefValue::Direct(ObjectId::try_parse(content)?)))
        }
    }
}

/// Reference store rooted at a `.git` directory
#[derive(Debug, new)]
pub struct Refs {
    path: Box<Path>,
}

impl Refs {
    pub fn head_path(&self) -> PathBuf {
        self.path.join(HEAD_REF_NAME)
    }

    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs")
    }

    pub fn heads_path(&self) -> PathBuf {
        self.refs_path().join("heads")
    }

    /// Object id HEAD ultimately points at; `None` on an unborn branch
    pub fn read_head(&self) -> anyhow::Result<Option<ObjectId>> {
        self.read_symref(&self.head_path())
    }

    /// Full name of the ref HEAD resolves through, or `HEAD` when detached
    pub fn current_ref(&self) -> anyhow::Result<String> {
        let mut current = HEAD_REF_NAME.to_string();
        while let Some(RefValue::Symbolic(target)) = RefValue::read(&self.path.join(&current))? {
            current = target;
        }
        Ok(current)
    }

    fn read_symref(&self, path: &Path) -> anyhow::Result<Option<ObjectId>> {
        match RefValue::read(path)? {
            Some(RefValue::Symbolic(target)) => self.read_symref(&self.path.join(target)),
            Some(RefValue::Direct(oid)) => Ok(Some(oid)),
            None => Ok(None),
        }
    }

    /// Advance whatever HEAD points at (the current branch, or HEAD itself when detached)
    pub fn update_head(&self, oid: ObjectId) -> anyhow::Result<()> {
        let target = self.current_ref()?;
        self.write_ref_file(&self.path.join(target), oid.to_string())
    }

    /// Point HEAD directly at a commit
    pub fn detach_head(&self, oid: ObjectId) -> anyhow::Result<()> {
        self.write_ref_file(&self.head_path(), oid.to_string())
    }

    /// Point HEAD at a ref such as `refs/heads/master`
    pub fn set_head_symbolic(&self, ref_name: &str) -> anyhow::Result<()> {
        self.set_symbolic_ref(HEAD_REF_NAME, ref_name)
    }

    /// Make `ref_name` a symbolic ref to `target`, e.g. `refs/remotes/origin/HEAD`
    pub fn set_symbolic_ref(&self, ref_name: &str, target: &str) -> anyhow::Result<()> {
        self.write_ref_file(&self.path.join(ref_name), format!("ref: {target}"))
    }

    pub fn read_ref(&self, ref_name: &str) -> anyhow::Result<Option<ObjectId>> {
        self.read_symref(&self.path.join(ref_name))
    }

    /// Write a direct ref such as `refs/heads/topic`, creating directories as needed
    pub fn update_ref(&self, ref_name: &str, oid: ObjectId) -> anyhow::Result<()> {
        self.write_ref_file(&self.path.join(ref_name), oid.to_string())
    }

    fn write_ref_file(&self, path: &Path, raw_ref: String) -> anyhow::Result<()> {
        std::fs::create_dir_all(path.parent().with_context(|| {
            format!("invalid ref file path {}", path.display())
        })?)?;

        let mut ref_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to open ref file at {}", path.display()))?;
        let mut lock = file_guard::lock(&mut ref_file, Lock::Exclusive, 0, 1)?;
        writeln!(lock.deref_mut(), "{raw_ref}")?;

        tracing::debug!(path = %path.display(), value = %raw_ref, "updated ref");
        Ok(())
    }

    /// Every ref file below `prefix` (e.g. `refs/heads`) with its target
    pub fn list_refs(&self, prefix: &str) -> anyhow::Result<Vec<(String, ObjectId)>> {
        let root = self.path.join(prefix);
        let mut refs = Vec::new();
        if !root.is_dir() {
            return Ok(refs);
        }

        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry
                .path()
                .strip_prefix(self.path.as_ref())?
                .to_string_lossy()
                .into_owned();
            if let Some(oid) = self.read_symref(entry.path())? {
                refs.push((name, oid));
            }
        }

        Ok(refs)
    }

    /// Resolve a revision expression to an object id
    ///
    /// Ref names win over object id prefixes. Fails with
    /// [`RepositoryError::NameNotFound`] when nothing matches.
    pub fn resolve_name(&self, name: &str, database: &Database) -> anyhow::Result<ObjectId> {
        let revision = Revision::try_parse(name)?;
        self.resolve_revision(&revision, database)?
            .ok_or_else(|| RepositoryError::NameNotFound(name.to_string()).into())
    }

    fn resolve_revision(
        &self,
        revision: &Revision,
        database: &Database,
    ) -> anyhow::Result<Option<ObjectId>> {
        match revision {
            Revision::Name(name) => self.resolve_plain_name(name, database),
            Revision::Parent(base) => match self.resolve_revision(base, database)? {
                Some(oid) => Self::first_parent(oid, database),
                None => Ok(None),
            },
            Revision::Ancestor(base, generations) => {
                let mut oid = self.resolve_revision(base, database)?;
                for _ in 0..*generations {
                    oid = match oid {
                        Some(oid) => Self::first_parent(oid, database)?,
                        None => return Ok(None),
                    };
                }
                Ok(oid)
            }
        }
    }

    fn first_parent(oid: ObjectId, database: &Database) -> anyhow::Result<Option<ObjectId>> {
        let commit_oid = database.peel_to_commit(&oid)?;
        let commit = database
            .parse_object_as_commit(&commit_oid)?
            .with_context(|| format!("object {oid} is not a commit"))?;
        Ok(commit.parent().copied())
    }

    fn resolve_plain_name(&self, name: &str, database: &Database) -> anyhow::Result<Option<ObjectId>> {
        let remote_candidate = format!("{REMOTES_PREFIX}/{name}");
        let remote_head_candidate = format!("{REMOTES_PREFIX}/{name}/{HEAD_REF_NAME}");
        let candidates = REF_SEARCH_PREFIXES
            .iter()
            .map(|prefix| Path::new(prefix).join(name))
            .chain([PathBuf::from(remote_candidate), PathBuf::from(remote_head_candidate)]);

        for candidate in candidates {
            if let Some(oid) = self.read_symref(&self.path.join(candidate))? {
                return Ok(Some(oid));
            }
        }

        if Revision::looks_like_oid(name) {
            return self.resolve_oid_prefix(name, database);
        }

        Ok(None)
    }

    fn resolve_oid_prefix(&self, prefix: &str, database: &Database) -> anyhow::Result<Option<ObjectId>> {
        let prefix = prefix.to_ascii_lowercase();
        let matches = database.find_objects_by_prefix(&prefix)?;

        match matches.as_slice() {
            [] => Ok(None),
            [oid] => Ok(Some(*oid)),
            candidates => {
                // prefer the single commit among ambiguous candidates
                let commits = candidates
                    .iter()
                    .filter(|oid| {
                        database
                            .get_object_type(oid)
                            .map(|kind| kind == ObjectType::Commit)
                            .unwrap_or(false)
                    })
                    .collect::<Vec<_>>();

                match commits.as_slice() {
                    [oid] => Ok(Some(**oid)),
                    _ => {
                        let mut message = format!("short object id {prefix} is ambiguous");
                        for oid in candidates {
                            message.push_str(&format!("\nhint:   {}", oid.to_short_oid()));
                        }
                        anyhow::bail!(message)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::blob::Blob;
    use crate::artifacts::objects::commit::{Author, Commit};
    use crate::artifacts::objects::tree::Tree;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    struct Fixture {
        _dir: TempDir,
        refs: Refs,
        database: Database,
        commits: Vec<ObjectId>,
    }

    /// three commits on master, HEAD -> refs/heads/master
    #[fixture]
    fn history() -> Fixture {
        let dir = TempDir::new().unwrap();
        let git_dir = dir.path().join(".git");
        let database = Database::new(git_dir.join("objects").into());
        let refs = Refs::new(git_dir.into());
        refs.set_head_symbolic("refs/heads/master").unwrap();

        let tree = database.store(&Tree::default()).unwrap();
        let mut commits = Vec::new();
        let mut parents = Vec::new();
        for message in ["one", "two", "three"] {
            let author = Author::new("Ada".into(), "ada@example.com".into());
            let commit = Commit::new(parents.clone(), tree, author, message.to_string());
            let oid = database.store(&commit).unwrap();
            refs.update_head(oid).unwrap();
            parents = vec![oid];
            commits.push(oid);
        }

        Fixture {
            _dir: dir,
            refs,
            database,
            commits,
        }
    }

    #[rstest]
    fn head_follows_the_current_branch(history: Fixture) {
        assert_eq!(history.refs.current_ref().unwrap(), "refs/heads/master");
        assert_eq!(history.refs.read_head().unwrap(), Some(history.commits[2]));
        assert_eq!(
            history.refs.read_ref("refs/heads/master").unwrap(),
            Some(history.commits[2])
        );
    }

    #[rstest]
    #[case("HEAD", 2)]
    #[case("@", 2)]
    #[case("master", 2)]
    #[case("refs/heads/master", 2)]
    #[case("HEAD^", 1)]
    #[case("master~2", 0)]
    fn resolves_names_and_ancestry(history: Fixture, #[case] name: &str, #[case] expected: usize) {
        assert_eq!(
            history.refs.resolve_name(name, &history.database).unwrap(),
            history.commits[expected]
        );
    }

    #[rstest]
    fn resolves_abbreviated_object_ids(history: Fixture) {
        let short = history.commits[1].to_short_oid();

        assert_eq!(
            history.refs.resolve_name(&short, &history.database).unwrap(),
            history.commits[1]
        );
    }

    #[rstest]
    fn unknown_names_are_reported(history: Fixture) {
        let error = history
            .refs
            .resolve_name("no-such-branch", &history.database)
            .unwrap_err();

        assert!(matches!(
            RepositoryError::find(&error),
            Some(RepositoryError::NameNotFound(name)) if name == "no-such-branch"
        ));
    }

    #[rstest]
    fn remote_tracking_refs_resolve_by_short_name(history: Fixture) {
        history
            .refs
            .update_ref("refs/remotes/origin/master", history.commits[0])
            .unwrap();
        let blob = history.database.store(&Blob::from("x")).unwrap();
        history.refs.update_ref("refs/tags/v1", blob).unwrap();

        assert_eq!(
            history.refs.resolve_name("origin/master", &history.database).unwrap(),
            history.commits[0]
        );
        assert_eq!(history.refs.resolve_name("v1", &history.database).unwrap(), blob);
        assert_eq!(
            history
                .refs
                .list_refs("refs/remotes")
                .unwrap()
                .into_iter()
                .map(|(name, _)| name)
                .collect::<Vec<_>>(),
            vec!["refs/remotes/origin/master".to_string()]
        );
    }
}
