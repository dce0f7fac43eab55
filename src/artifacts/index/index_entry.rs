//! Index entry representation
//!
//! Each entry in the index records, for one `(path, stage)` pair:
//! - File path
//! - Content hash (object ID)
//! - Merge stage (0 resolved, 1 base, 2 ours, 3 theirs)
//! - File metadata (mode, size, timestamps)
//!
//! ## Entry Format
//!
//! Entries are stored in a binary format with 8-byte alignment. The 16-bit
//! flags field packs the path length (low 12 bits) and the stage (bits 12-13).
//! Stat metadata lets change detection skip rehashing files whose size and
//! timestamps still match.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt};
use bytes::Bytes;
use is_executable::IsExecutable;
use std::cmp::min;
use std::fs::Metadata;
use std::io::{BufRead, Read, Write};
use std::os::unix::prelude::MetadataExt;
use std::path::{Path, PathBuf};

/// Maximum path length representable in the flags field
const MAX_PATH_SIZE: usize = 0xfff;

const STAGE_SHIFT: u16 = 12;
const STAGE_MASK: u16 = 0x3000;

/// Block size for entry alignment (8 bytes)
pub const ENTRY_BLOCK: usize = 8;

/// Minimum size of an index entry in bytes
pub const ENTRY_MIN_SIZE: usize = 64;

/// Merge stage of an index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Stage {
    #[default]
    Resolved = 0,
    Base = 1,
    Ours = 2,
    Theirs = 3,
}

impl Stage {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    pub fn is_conflict(&self) -> bool {
        *self != Stage::Resolved
    }

    pub const CONFLICT_STAGES: [Stage; 3] = [Stage::Base, Stage::Ours, Stage::Theirs];
}

impl TryFrom<u16> for Stage {
    type Error = anyhow::Error;

    fn try_from(value: u16) -> anyhow::Result<Self> {
        match value {
            0 => Ok(Stage::Resolved),
            1 => Ok(Stage::Base),
            2 => Ok(Stage::Ours),
            3 => Ok(Stage::Theirs),
            _ => Err(anyhow::anyhow!("Invalid index stage {value}")),
        }
    }
}

/// Index entry for one `(path, stage)` slot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexEntry {
    /// File path relative to repository root
    pub name: PathBuf,
    /// Hash of the blob (or commit, for gitlinks)
    pub oid: ObjectId,
    pub stage: Stage,
    /// File metadata (mode, size, timestamps)
    pub metadata: EntryMetadata,
}

impl IndexEntry {
    /// Resolved (stage 0) entry
    pub fn new(name: PathBuf, oid: ObjectId, metadata: EntryMetadata) -> Self {
        IndexEntry {
            name,
            oid,
            stage: Stage::Resolved,
            metadata,
        }
    }

    /// Entry without stat information, as produced from a tree
    pub fn from_database_entry(name: PathBuf, entry: &DatabaseEntry, stage: Stage) -> Self {
        IndexEntry {
            name,
            oid: entry.oid,
            stage,
            metadata: EntryMetadata {
                mode: entry.mode,
                ..Default::default()
            },
        }
    }

    pub fn mode(&self) -> EntryMode {
        self.metadata.mode
    }

    pub fn database_entry(&self) -> DatabaseEntry {
        DatabaseEntry::new(self.oid, self.metadata.mode)
    }

    /// Ordering key: slash-separated path bytes, then stage
    pub fn key(&self) -> (String, Stage) {
        (path_key(&self.name), self.stage)
    }

    pub fn basename(&self) -> anyhow::Result<&str> {
        self.name
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid file name"))
    }

    /// Every proper ancestor directory of the entry, outermost first
    pub fn parent_dirs(&self) -> Vec<&Path> {
        let mut dirs = self
            .name
            .ancestors()
            .skip(1)
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect::<Vec<_>>();
        dirs.reverse();
        dirs
    }

    pub fn stat_match(&self, other: &EntryMetadata) -> bool {
        (self.metadata.size == 0 || self.metadata.size == other.size)
            && self.metadata.mode == other.mode
    }

    pub fn times_match(&self, other: &EntryMetadata) -> bool {
        self.metadata.ctime == other.ctime
            && self.metadata.ctime_nsec == other.ctime_nsec
            && self.metadata.mtime == other.mtime
            && self.metadata.mtime_nsec == other.mtime_nsec
    }
}

/// Slash-separated form of a repository-relative path
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// File metadata cached in index entries
///
/// - `ctime`: File status change time (inode modification)
/// - `mtime`: File content modification time
///
/// Both include nanosecond precision for accurate change detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub ctime: i64,
    pub ctime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub dev: u64,
    pub ino: u64,
    pub mode: EntryMode,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
}

/// Number of 32-bit stat words preceding the object id
const STAT_WORDS: usize = 10;
const OID_OFFSET: usize = STAT_WORDS * 4;
const FLAGS_OFFSET: usize = OID_OFFSET + 20;
const NAME_OFFSET: usize = FLAGS_OFFSET + 2;

impl EntryMetadata {
    /// Stat fields in on-disk order, truncated to 32 bits
    fn to_words(self) -> [u32; STAT_WORDS] {
        [
            self.ctime as u32,
            self.ctime_nsec as u32,
            self.mtime as u32,
            self.mtime_nsec as u32,
            self.dev as u32,
            self.ino as u32,
            self.mode.as_u32(),
            self.uid,
            self.gid,
            self.size as u32,
        ]
    }

    fn from_words(words: [u32; STAT_WORDS]) -> anyhow::Result<Self> {
        let [ctime, ctime_nsec, mtime, mtime_nsec, dev, ino, mode, uid, gid, size] = words;

        Ok(EntryMetadata {
            ctime: ctime.into(),
            ctime_nsec: ctime_nsec.into(),
            mtime: mtime.into(),
            mtime_nsec: mtime_nsec.into(),
            dev: dev.into(),
            ino: ino.into(),
            mode: EntryMode::try_from(mode)?,
            uid,
            gid,
            size: size.into(),
        })
    }
}

impl Packable for IndexEntry {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let name = self
            .name
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("entry path {} is not UTF-8", self.name.display()))?;
        let flags = min(name.len(), MAX_PATH_SIZE) as u16 | (self.stage.as_u16() << STAGE_SHIFT);

        let padded_len = (NAME_OFFSET + name.len() + 1).next_multiple_of(ENTRY_BLOCK);
        let mut buffer = Vec::with_capacity(padded_len);
        for word in self.metadata.to_words() {
            buffer.write_u32::<NetworkEndian>(word)?;
        }
        self.oid.write_raw_to(&mut buffer)?;
        buffer.write_u16::<NetworkEndian>(flags)?;
        buffer.write_all(name.as_bytes())?;
        buffer.resize(padded_len, 0);

        Ok(Bytes::from(buffer))
    }
}

impl Unpackable for IndexEntry {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        anyhow::ensure!(
            bytes.len() >= ENTRY_MIN_SIZE,
            "index entry of {} bytes is truncated",
            bytes.len()
        );

        let mut words = [0u32; STAT_WORDS];
        NetworkEndian::read_u32_into(&bytes[..OID_OFFSET], &mut words);
        let metadata = EntryMetadata::from_words(words)?;
        let oid = ObjectId::read_raw_from(&mut &bytes[OID_OFFSET..FLAGS_OFFSET])?;
        let flags = NetworkEndian::read_u16(&bytes[FLAGS_OFFSET..NAME_OFFSET]);
        let stage = Stage::try_from((flags & STAGE_MASK) >> STAGE_SHIFT)?;

        let name_len = bytes[NAME_OFFSET..]
            .iter()
            .position(|&byte| byte == 0)
            .ok_or_else(|| anyhow::anyhow!("index entry name is not NUL-terminated"))?;
        let name = PathBuf::from(std::str::from_utf8(&bytes[NAME_OFFSET..NAME_OFFSET + name_len])?);

        Ok(IndexEntry {
            name,
            oid,
            stage,
            metadata,
        })
    }
}

impl TryFrom<(&Path, Metadata)> for EntryMetadata {
    type Error = anyhow::Error;

    /// Build stat metadata from an absolute path and its `symlink_metadata`
    fn try_from((file_path, metadata): (&Path, Metadata)) -> Result<Self, Self::Error> {
        let file_type = metadata.file_type();
        let mode = if file_type.is_symlink() {
            EntryMode::Symlink
        } else if file_type.is_dir() {
            EntryMode::Directory
        } else if file_path.is_executable() {
            EntryMode::File(FileMode::Executable)
        } else {
            EntryMode::File(FileMode::Regular)
        };

        Ok(Self {
            ctime: metadata.ctime(),
            ctime_nsec: metadata.ctime_nsec(),
            mtime: metadata.mtime(),
            mtime_nsec: metadata.mtime_nsec(),
            dev: metadata.dev(),
            ino: metadata.ino(),
            mode,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size(),
        })
    }
}
