//! Operations on a [`Repository`](crate::areas::repository::Repository)
//!
//! - `plumbing`: object level access (cat-file, hash-object, ls-tree, write-tree)
//! - `porcelain`: workflows built on top (add, commit, diff, merge, submodule update)

pub mod plumbing;
pub mod porcelain;
