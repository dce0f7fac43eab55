//! Lazy pre-order tree traversal
//!
//! The walker yields `(path, entry)` pairs: a directory before its children,
//! children in tree order, each subtree exhausted before the next sibling.
//! A subtree is only read from the store when the walker actually descends
//! into it, so callers may stop early or call [`TreeWalker::skip_subtree`]
//! right after seeing a directory to avoid loading it at all.

use crate::areas::database::Database;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::TreeEntry;
use anyhow::Context;
use std::path::PathBuf;

pub struct TreeWalker<'db> {
    database: &'db Database,
    root: Option<ObjectId>,
    stack: Vec<(PathBuf, std::vec::IntoIter<TreeEntry>)>,
    pending_descent: Option<(PathBuf, ObjectId)>,
}

impl<'db> TreeWalker<'db> {
    pub fn new(database: &'db Database, root: ObjectId) -> Self {
        TreeWalker {
            database,
            root: Some(root),
            stack: Vec::new(),
            pending_descent: None,
        }
    }

    /// Do not descend into the directory that was yielded last
    pub fn skip_subtree(&mut self) {
        self.pending_descent = None;
    }

    fn push_tree(&mut self, prefix: PathBuf, oid: ObjectId) -> anyhow::Result<()> {
        let handle = self.database.handle(oid);
        let entries = handle
            .as_tree()
            .with_context(|| format!("reading subtree at '{}'", prefix.display()))?
            .entries()
            .cloned()
            .collect::<Vec<_>>();
        self.stack.push((prefix, entries.into_iter()));

        Ok(())
    }

    fn advance(&mut self) -> anyhow::Result<Option<(PathBuf, TreeEntry)>> {
        if let Some(root) = self.root.take() {
            self.push_tree(PathBuf::new(), root)?;
        }
        if let Some((prefix, oid)) = self.pending_descent.take() {
            self.push_tree(prefix, oid)?;
        }

        while let Some((prefix, entries)) = self.stack.last_mut() {
            match entries.next() {
                Some(entry) => {
                    let path = prefix.join(&entry.name);
                    if entry.mode.is_tree() {
                        self.pending_descent = Some((path.clone(), entry.oid));
                    }
                    return Ok(Some((path, entry)));
                }
                None => {
                    self.stack.pop();
                }
            }
        }

        Ok(None)
    }
}

impl Iterator for TreeWalker<'_> {
    type Item = anyhow::Result<(PathBuf, TreeEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(item) => item.map(Ok),
            Err(error) => {
                // a failed read ends the walk
                self.stack.clear();
                self.pending_descent = None;
                Some(Err(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::blob::Blob;
    use crate::artifacts::objects::tree::Tree;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    struct Fixture {
        _dir: TempDir,
        database: Database,
        root: ObjectId,
    }

    /// root/
    ///   a.txt
    ///   dir/
    ///     inner/
    ///       deep.txt
    ///     x.txt
    ///   z.txt
    #[fixture]
    fn nested() -> Fixture {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().into());
        let file = EntryMode::File(FileMode::Regular);
        let blob = database.store(&Blob::from("data")).unwrap();

        let inner = Tree::try_from_entries(vec![TreeEntry::new("deep.txt".into(), file, blob)]).unwrap();
        let inner = database.store(&inner).unwrap();
        let dir_tree = Tree::try_from_entries(vec![
            TreeEntry::new("x.txt".into(), file, blob),
            TreeEntry::new("inner".into(), EntryMode::Directory, inner),
        ])
        .unwrap();
        let dir_tree = database.store(&dir_tree).unwrap();
        let root = Tree::try_from_entries(vec![
            TreeEntry::new("z.txt".into(), file, blob),
            TreeEntry::new("dir".into(), EntryMode::Directory, dir_tree),
            TreeEntry::new("a.txt".into(), file, blob),
        ])
        .unwrap();
        let root = database.store(&root).unwrap();

        Fixture {
            _dir: dir,
            database,
            root,
        }
    }

    #[rstest]
    fn walks_in_pre_order(nested: Fixture) {
        let paths = nested
            .database
            .traverse(nested.root)
            .map(|item| item.unwrap().0)
            .collect::<Vec<_>>();

        assert_eq!(
            paths,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("dir"),
                PathBuf::from("dir/inner"),
                PathBuf::from("dir/inner/deep.txt"),
                PathBuf::from("dir/x.txt"),
                PathBuf::from("z.txt"),
            ]
        );
    }

    #[rstest]
    fn skipped_subtrees_are_not_visited(nested: Fixture) {
        let mut walker = nested.database.traverse(nested.root);
        let mut paths = Vec::new();

        while let Some(item) = walker.next() {
            let (path, entry) = item.unwrap();
            if entry.mode.is_tree() {
                walker.skip_subtree();
            }
            paths.push(path);
        }

        assert_eq!(
            paths,
            vec![PathBuf::from("a.txt"), PathBuf::from("dir"), PathBuf::from("z.txt")]
        );
    }
}
