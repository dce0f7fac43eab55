//! Object types and operations
//!
//! All content is stored as objects identified by SHA-1 hashes. There are four types:
//!
//! - **Blob**: File content (raw bytes)
//! - **Tree**: Directory listing (names, modes, and object IDs)
//! - **Commit**: Snapshot with metadata (author, message, parent commits, tree)
//! - **Tag**: Annotated reference to another object
//!
//! All objects implement serialization/deserialization for the loose object format:
//! `<type> <size>\0<content>`
//!
//! Reading helpers live next to the types:
//!
//! - `handle`: a hash plus a memoized decoded form, loaded on first access
//! - `tree_builder`: arena-based bottom-up tree construction from index entries
//! - `walker`: lazy pre-order traversal of a stored tree

pub mod blob;
pub mod commit;
pub mod handle;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod tag;
pub mod tree;
pub mod tree_builder;
pub mod walker;

/// Length of a SHA-1 hash in hexadecimal format
pub const OBJECT_ID_LENGTH: usize = 40;

/// Length of a SHA-1 hash in raw bytes
pub const OBJECT_ID_RAW_LENGTH: usize = 20;
