use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::{Diffable, LeafSet};
use crate::artifacts::index::index_entry::EntryMetadata;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree_builder::TreeBuilder;
use crate::artifacts::status::inspector::Inspector;
use bytes::Bytes;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

fn stored_content(database: &Database, path: &Path, entry: &DatabaseEntry) -> anyhow::Result<Bytes> {
    let (_, payload) = database.get(&entry.oid).map_err(|error| {
        error.context(format!("Unable to load content of {}", path.display()))
    })?;
    Ok(payload)
}

/// A stored tree (commits and tags are peeled on construction)
pub struct TreeEndpoint<'r> {
    database: &'r Database,
    tree_oid: ObjectId,
}

impl<'r> TreeEndpoint<'r> {
    pub fn new(database: &'r Database, tree_ish: &ObjectId) -> anyhow::Result<Self> {
        Ok(TreeEndpoint {
            database,
            tree_oid: database.peel_to_tree(tree_ish)?,
        })
    }

    pub fn oid(&self) -> &ObjectId {
        &self.tree_oid
    }
}

impl Diffable for TreeEndpoint<'_> {
    fn tree_oid(&self) -> anyhow::Result<Option<ObjectId>> {
        Ok(Some(self.tree_oid))
    }

    fn leaf_entries(&self) -> anyhow::Result<LeafSet> {
        Ok(LeafSet {
            entries: self.database.flatten_tree(&self.tree_oid)?,
            unmerged: Default::default(),
        })
    }

    fn content(&self, path: &Path, entry: &DatabaseEntry) -> anyhow::Result<Bytes> {
        stored_content(self.database, path, entry)
    }
}

/// The staging area as loaded from disk
pub struct IndexEndpoint<'r> {
    database: &'r Database,
    index: &'r Index,
}

impl<'r> IndexEndpoint<'r> {
    pub fn new(database: &'r Database, index: &'r Index) -> Self {
        IndexEndpoint { database, index }
    }
}

impl Diffable for IndexEndpoint<'_> {
    /// Hash of the tree a commit would record right now
    fn tree_oid(&self) -> anyhow::Result<Option<ObjectId>> {
        if self.index.has_conflicts() {
            return Ok(None);
        }

        let mut builder = TreeBuilder::new();
        for entry in self.index.resolved_entries() {
            builder.insert(&entry.name, entry.mode(), entry.oid)?;
        }
        Ok(Some(builder.hash()?))
    }

    fn leaf_entries(&self) -> anyhow::Result<LeafSet> {
        Ok(LeafSet {
            entries: self
                .index
                .resolved_entries()
                .map(|entry| (entry.name.clone(), entry.database_entry()))
                .collect(),
            unmerged: self.index.conflicts().into_iter().collect(),
        })
    }

    fn content(&self, path: &Path, entry: &DatabaseEntry) -> anyhow::Result<Bytes> {
        stored_content(self.database, path, entry)
    }
}

/// Files on disk, hashed on demand
///
/// An index entry whose cached stat still matches the file is trusted
/// without rereading it. Files that had to be rehashed but turned out
/// unchanged are remembered so the caller can refresh their cached stat.
pub struct WorkingDirectoryEndpoint<'r> {
    repository: &'r Repository,
    index: &'r Index,
    stale_stats: RefCell<Vec<(PathBuf, EntryMetadata)>>,
}

impl<'r> WorkingDirectoryEndpoint<'r> {
    pub fn new(repository: &'r Repository, index: &'r Index) -> Self {
        WorkingDirectoryEndpoint {
            repository,
            index,
            stale_stats: RefCell::new(Vec::new()),
        }
    }

    /// Entries whose content matched the index although their stat did not
    pub fn into_stale_stats(self) -> Vec<(PathBuf, EntryMetadata)> {
        self.stale_stats.into_inner()
    }

    fn leaf_oid(&self, path: &Path, stat: &EntryMetadata) -> anyhow::Result<ObjectId> {
        let inspector = Inspector::new(self.repository);
        let Some(entry) = self.index.entry_by_path(path) else {
            return inspector.content_oid(path, stat);
        };

        if !stat.mode.is_gitlink() && entry.stat_match(stat) && entry.times_match(stat) {
            return Ok(entry.oid);
        }

        let oid = inspector.content_oid(path, stat)?;
        if oid == entry.oid && entry.mode() == stat.mode && !stat.mode.is_gitlink() {
            self.stale_stats.borrow_mut().push((path.to_path_buf(), *stat));
        }
        Ok(oid)
    }
}

impl Diffable for WorkingDirectoryEndpoint<'_> {
    fn tree_oid(&self) -> anyhow::Result<Option<ObjectId>> {
        Ok(None)
    }

    fn leaf_entries(&self) -> anyhow::Result<LeafSet> {
        let mut entries = std::collections::BTreeMap::new();
        for (path, stat) in self.repository.workspace().list_working_directory()? {
            let oid = self.leaf_oid(&path, &stat)?;
            entries.insert(path, DatabaseEntry::new(oid, stat.mode));
        }

        Ok(LeafSet {
            entries,
            unmerged: Default::default(),
        })
    }

    fn content(&self, path: &Path, _entry: &DatabaseEntry) -> anyhow::Result<Bytes> {
        self.repository.workspace().read_file(path)
    }
}
