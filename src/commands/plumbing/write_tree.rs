use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::core::error::RepositoryError;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree_builder::TreeBuilder;

impl Repository {
    /// Store the current index as a tree (and all its subtrees)
    pub fn write_tree(&self) -> anyhow::Result<ObjectId> {
        let index = self.load_index()?;
        self.write_tree_from(&index)
    }

    pub(crate) fn write_tree_from(&self, index: &Index) -> anyhow::Result<ObjectId> {
        if index.has_conflicts() {
            return Err(RepositoryError::DirtyMergeState(index.conflicts().len()).into());
        }

        let mut builder = TreeBuilder::new();
        for entry in index.resolved_entries() {
            builder.insert(&entry.name, entry.mode(), entry.oid)?;
        }

        builder.finish(|tree| self.database().store(tree))
    }
}
