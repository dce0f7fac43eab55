use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use derive_new::new;

/// A `(hash, mode)` pair as recorded by a tree entry or an index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, new)]
pub struct DatabaseEntry {
    pub oid: ObjectId,
    pub mode: EntryMode,
}

impl DatabaseEntry {
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }

    pub fn is_gitlink(&self) -> bool {
        self.mode.is_gitlink()
    }
}
