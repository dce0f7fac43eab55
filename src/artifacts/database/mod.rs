//! `(hash, mode)` pairs shared by trees, the index, diffs and merges

pub mod database_entry;
