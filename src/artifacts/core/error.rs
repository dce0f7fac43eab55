//! Typed error kinds
//!
//! Engine functions return `anyhow::Result` and attach context as they
//! propagate. Failures callers are expected to branch on are raised as a
//! [`RepositoryError`] so they can be recovered with
//! `err.downcast_ref::<RepositoryError>()` regardless of the context layers.

use crate::artifacts::objects::object_id::ObjectId;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("name could not be resolved: {0}")]
    NameNotFound(String),

    #[error("pathspec '{}' did not match any files", .0.display())]
    PathNotFound(PathBuf),

    #[error("cannot commit: {0} path(s) have unresolved merge conflicts")]
    DirtyMergeState(usize),

    #[error("submodule '{}' is not bound to a parent commit", .0.display())]
    UnboundParentContext(PathBuf),

    #[error("submodule '{}' has uncommitted changes; use force to discard them", .0.display())]
    DirtyNestedRepository(PathBuf),

    #[error("submodule configuration and tree disagree at '{}': {reason}", .path.display())]
    InconsistentSubmoduleConfig { path: PathBuf, reason: String },
}

impl RepositoryError {
    /// Find a typed error anywhere in an `anyhow` chain
    pub fn find(error: &anyhow::Error) -> Option<&RepositoryError> {
        error
            .chain()
            .find_map(|cause| cause.downcast_ref::<RepositoryError>())
    }
}
