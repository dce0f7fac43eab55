use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};

/// Local state a checkout would destroy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConflictType {
    /// Tracked file with changes not in either tree
    StaleFile,
    /// Directory in the way that holds untracked files
    StaleDirectory,
    /// Untracked file where the target tree puts a file
    UntrackedOverwritten,
    /// Untracked file the checkout would delete with its directory
    UntrackedRemoved,
}

impl ConflictType {
    pub fn description(&self) -> &'static str {
        match self {
            ConflictType::StaleFile => "local changes would be overwritten by checkout",
            ConflictType::StaleDirectory => "updating directories would lose untracked files in them",
            ConflictType::UntrackedOverwritten => "untracked working tree files would be overwritten by checkout",
            ConflictType::UntrackedRemoved => "untracked working tree files would be removed by checkout",
        }
    }

    pub fn classify(
        stat: Option<&EntryMetadata>,
        entry: Option<&IndexEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> ConflictType {
        if entry.is_some() {
            ConflictType::StaleFile
        } else if let Some(stat) = stat
            && stat.mode.is_tree()
        {
            ConflictType::StaleDirectory
        } else if new_entry.is_some() {
            ConflictType::UntrackedOverwritten
        } else {
            ConflictType::UntrackedRemoved
        }
    }
}
