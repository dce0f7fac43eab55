//! Nested repositories
//!
//! - `config`: `.gitmodules` parsing
//! - `descriptor`: one submodule as a parent commit records it
//! - `graph`: every submodule of one commit
//! - `fetcher`: bringing a submodule's objects into place
//! - `root_module`: synchronizing checkouts with what HEAD records

pub mod config;
pub mod descriptor;
pub mod fetcher;
pub mod graph;
pub mod root_module;
