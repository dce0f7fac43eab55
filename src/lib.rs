//! Typed access to git object stores, the staging index and nested
//! submodule trees.
//!
//! - `areas`: On-disk areas of a repository (database, index, refs, workspace)
//! - `artifacts`: Git data structures and algorithms
//! - `commands`: Plumbing and porcelain operations on a [`areas::repository::Repository`]

pub mod areas;
pub mod artifacts;
pub mod commands;
