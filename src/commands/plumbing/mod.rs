//! Plumbing commands (low-level object access)
//!
//! - `cat-file`: print an object
//! - `hash-object`: compute an object id and optionally store the blob
//! - `ls-tree`: list the entries of a tree-ish
//! - `write-tree`: store the index as a tree

pub mod cat_file;
pub mod hash_object;
pub mod ls_tree;
pub mod write_tree;
