//! Tree object
//!
//! Trees represent directory snapshots. They contain entries for files (blobs),
//! symbolic links, subdirectories (other trees) and gitlinks (commits inside
//! nested repositories), along with their names and modes.
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<mode> <name>\0<20-byte-sha1>`
//!
//! Entries are sorted by raw name bytes, where a subtree sorts as if its name
//! carried a trailing `/`. Decoding never touches child objects; descending
//! into subtrees is the job of [`crate::artifacts::objects::walker::TreeWalker`].

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use derive_new::new;
use std::cmp::Ordering;
use std::io::{BufRead, Write};

/// One named entry of a tree
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct TreeEntry {
    pub name: String,
    pub mode: EntryMode,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn database_entry(&self) -> DatabaseEntry {
        DatabaseEntry::new(self.oid, self.mode)
    }

    pub fn object_type(&self) -> ObjectType {
        match self.mode {
            EntryMode::Directory => ObjectType::Tree,
            EntryMode::Gitlink => ObjectType::Commit,
            _ => ObjectType::Blob,
        }
    }

    /// Compare two entries the way trees order them on disk
    pub fn tree_order(&self, other: &TreeEntry) -> Ordering {
        compare_tree_names(&self.name, self.mode.is_tree(), &other.name, other.mode.is_tree())
    }
}

/// Byte-wise name comparison where directories compare as `name/`
pub fn compare_tree_names(a: &str, a_is_tree: bool, b: &str, b_is_tree: bool) -> Ordering {
    let a_key = a.bytes().chain(a_is_tree.then_some(b'/'));
    let b_key = b.bytes().chain(b_is_tree.then_some(b'/'));

    a_key.cmp(b_key)
}

/// Tree object representing a directory snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree from entries in any order
    ///
    /// Fails on empty names, names containing `/` or NUL, and duplicate names.
    pub fn try_from_entries(mut entries: Vec<TreeEntry>) -> anyhow::Result<Self> {
        for entry in &entries {
            if entry.name.is_empty() || entry.name.contains(['/', '\0']) {
                anyhow::bail!("Invalid tree entry name {:?}", entry.name);
            }
        }

        entries.sort_by(|a, b| a.tree_order(b));
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].name == pair[1].name) {
            anyhow::bail!("Duplicate tree entry name {:?}", pair[0].name);
        }

        Ok(Tree { entries })
    }

    pub fn entries(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = TreeEntry> {
        self.entries.into_iter()
    }

    pub fn entry(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content_bytes = Vec::new();

        for entry in &self.entries {
            write!(content_bytes, "{} {}", entry.mode.as_str(), entry.name)?;
            content_bytes.push(0);
            entry.oid.write_raw_to(&mut content_bytes)?;
        }

        Ok(Bytes::from(content_bytes))
    }
}

impl Unpackable for Tree {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let mut entries = Vec::new();
        let mut reader = reader;

        // Reuse scratch buffers to reduce allocs
        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break; // clean EOF: no more entries
            }
            if mode_bytes.pop() != Some(b' ') {
                return Err(anyhow::anyhow!("unexpected EOF in mode"));
            }
            let mode = EntryMode::from_octal_str(std::str::from_utf8(&mode_bytes)?)?;

            name_bytes.clear();
            reader.read_until(b'\0', &mut name_bytes)?;
            if name_bytes.pop() != Some(b'\0') {
                return Err(anyhow::anyhow!("unexpected EOF in name"));
            }
            let name = std::str::from_utf8(&name_bytes)?.to_owned();

            let oid =
                ObjectId::read_raw_from(&mut reader).context("unexpected EOF in object id")?;

            entries.push(TreeEntry::new(name, mode, oid));
        }

        Ok(Tree { entries })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn display(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                format!(
                    "{} {} {}\t{}",
                    entry.mode,
                    entry.object_type(),
                    entry.oid,
                    entry.name
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    }
}
