//! On-disk areas of a repository
//!
//! - `database`: loose object store under `.git/objects`
//! - `index`: the staging area and its exclusive write session
//! - `refs`: `HEAD`, branches and revision resolution
//! - `repository`: the context value tying the areas and settings together
//! - `workspace`: the working directory, nested repositories included

pub mod database;
pub mod index;
pub mod refs;
pub mod repository;
pub mod workspace;
