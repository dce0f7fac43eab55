//! Git data structures and algorithms
//!
//! - `checkout`: Checkout migrations and conflict detection
//! - `core`: Errors and settings
//! - `database`: Database entry types
//! - `diff`: Change records, diff endpoints and rename similarity
//! - `index`: Index/staging area data structures
//! - `merge`: Merge base search and three-way tree merge
//! - `objects`: Git object types (blob, tree, commit, tag)
//! - `revision`: Revision expressions
//! - `status`: Working tree inspection
//! - `submodule`: Nested repositories

pub mod checkout;
pub mod core;
pub mod database;
pub mod diff;
pub mod index;
pub mod merge;
pub mod objects;
pub mod revision;
pub mod status;
pub mod submodule;
