//! Porcelain commands (user-facing operations)
//!
//! Each command is an `impl Repository` block. Commands that produce data
//! (`diff`, `merge`, `submodule_update`) return it; the binary decides how
//! to print it.
//!
//! ## Commands
//!
//! - `init`: Initialize a new repository
//! - `add` / `rm`: Stage or unstage paths
//! - `commit`: Record the index as a commit
//! - `diff`: Compare trees, the index and the working directory
//! - `checkout`: Move the working tree to another commit
//! - `merge` / `resolve`: Three-way merge and conflict resolution
//! - `submodule_update`: Synchronize nested repositories

pub mod add;
pub mod checkout;
pub mod commit;
pub mod diff;
pub mod init;
pub mod merge;
pub mod rm;
pub mod submodule;
