//! Working tree inspection
//!
//! Compares the working directory against the index and the index against
//! the `HEAD` tree. Checkout uses it to refuse overwriting local changes and
//! submodule update uses it to refuse removing dirty nested repositories.

pub mod file_change;
pub mod inspector;
