//! Merge algorithms
//!
//! - `ancestry`: best common ancestor search over the commit graph
//! - `three_way`: per-path three-way merge of trees into an index

pub mod ancestry;
pub mod three_way;

use crate::artifacts::index::index_entry::Stage;
use crate::artifacts::merge::three_way::MergeConflict;
use crate::artifacts::objects::object_id::ObjectId;

/// What a merge did to the current branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The other commit is already reachable from HEAD
    UpToDate,
    /// HEAD moved forward to the other commit without a merge commit
    FastForward(ObjectId),
    /// A merge commit was recorded
    Merged {
        commit: ObjectId,
        base: Option<ObjectId>,
    },
    /// Conflicts were left in the index; `MERGE_HEAD` records the other side
    Conflicted {
        base: Option<ObjectId>,
        conflicts: Vec<MergeConflict>,
    },
}

/// Version of a conflicted path to keep when resolving it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSide {
    Base,
    Ours,
    Theirs,
}

impl ConflictSide {
    pub fn stage(&self) -> Stage {
        match self {
            ConflictSide::Base => Stage::Base,
            ConflictSide::Ours => Stage::Ours,
            ConflictSide::Theirs => Stage::Theirs,
        }
    }
}
