//! Bottom-up tree construction from a flat path table
//!
//! Directory nodes live in an arena and refer to their children by index.
//! A node is always allocated after its parent, so walking the arena
//! backwards visits every child before the directory containing it and each
//! tree can be hashed as soon as it is reached.

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::{Tree, TreeEntry};
use anyhow::Context;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Default)]
struct DirNode {
    leaves: Vec<TreeEntry>,
    children: Vec<(String, usize)>,
}

#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<DirNode>,
    lookup: HashMap<PathBuf, usize>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        TreeBuilder {
            nodes: vec![DirNode::default()],
            lookup: HashMap::from([(PathBuf::new(), 0)]),
        }
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a leaf (blob, symlink or gitlink) at a slash-separated path
    pub fn insert(&mut self, path: &Path, mode: EntryMode, oid: ObjectId) -> anyhow::Result<()> {
        if mode.is_tree() {
            anyhow::bail!("Only leaf entries can be inserted, got a tree at {}", path.display());
        }

        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("Invalid entry path {}", path.display()))?;
        let parent = self.ensure_dir(path.parent().unwrap_or(Path::new("")))?;
        self.nodes[parent]
            .leaves
            .push(TreeEntry::new(name.to_string(), mode, oid));

        Ok(())
    }

    fn ensure_dir(&mut self, dir: &Path) -> anyhow::Result<usize> {
        if let Some(index) = self.lookup.get(dir) {
            return Ok(*index);
        }

        let mut current = 0;
        let mut prefix = PathBuf::new();
        for component in dir.components() {
            let Component::Normal(name) = component else {
                anyhow::bail!("Unsupported path component in {}", dir.display());
            };
            let name = name
                .to_str()
                .with_context(|| format!("Non UTF-8 directory name in {}", dir.display()))?;
            prefix.push(name);

            current = match self.lookup.get(&prefix) {
                Some(index) => *index,
                None => {
                    let index = self.nodes.len();
                    self.nodes.push(DirNode::default());
                    self.nodes[current].children.push((name.to_string(), index));
                    self.lookup.insert(prefix.clone(), index);
                    index
                }
            };
        }

        Ok(current)
    }

    /// Hash every directory bottom-up, handing each finished tree to `sink`
    ///
    /// The sink decides whether trees are persisted or only hashed; it must
    /// return the tree's id. Returns the id of the root tree.
    pub fn finish<F>(self, mut sink: F) -> anyhow::Result<ObjectId>
    where
        F: FnMut(&Tree) -> anyhow::Result<ObjectId>,
    {
        let mut oids: Vec<Option<ObjectId>> = vec![None; self.nodes.len()];

        for (index, node) in self.nodes.into_iter().enumerate().rev() {
            let mut entries = node.leaves;
            for (name, child) in node.children {
                let child_oid = oids[child].context("child tree hashed out of order")?;
                entries.push(TreeEntry::new(name, EntryMode::Directory, child_oid));
            }

            let tree = Tree::try_from_entries(entries)?;
            oids[index] = Some(sink(&tree)?);
        }

        oids[0].context("tree builder has no root")
    }

    /// Root tree id without persisting anything
    pub fn hash(self) -> anyhow::Result<ObjectId> {
        self.finish(|tree| tree.object_id())
    }
}
