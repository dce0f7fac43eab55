//! Content-addressable object store
//!
//! Objects are stored as zlib-compressed loose files under
//! `.git/objects/xx/yyyy…`, named after the SHA-1 of their uncompressed
//! `<type> <size>\0<payload>` record. The store never rewrites or deletes an
//! object: writing identical content twice is a no-op returning the same id.

use crate::artifacts::core::error::RepositoryError;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::handle::ObjectHandle;
use crate::artifacts::objects::object::{Object, ObjectBox, Unpackable, encode_record, hash_record};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::objects::walker::TreeWalker;
use anyhow::Context;
use bytes::Bytes;
use fake::rand;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Database {
    path: Box<Path>,
}

impl Database {
    pub fn new(path: Box<Path>) -> Self {
        Database { path }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self, object_id: &ObjectId) -> bool {
        self.path.join(object_id.to_path()).is_file()
    }

    /// Read an object's type and payload
    ///
    /// Fails with [`RepositoryError::NotFound`] when no such object is stored.
    pub fn get(&self, object_id: &ObjectId) -> anyhow::Result<(ObjectType, Bytes)> {
        let object_path = self.path.join(object_id.to_path());
        if !object_path.is_file() {
            return Err(RepositoryError::NotFound(*object_id).into());
        }

        let record = self.read_object(object_path)?;
        let mut reader = Cursor::new(record);
        let (object_type, size) = ObjectType::parse_header(&mut reader)
            .with_context(|| format!("Corrupt object header in {object_id}"))?;

        let offset = reader.position() as usize;
        let record = reader.into_inner();
        if record.len() - offset != size {
            anyhow::bail!(
                "Corrupt object {object_id}: header declares {size} bytes, found {}",
                record.len() - offset
            );
        }

        Ok((object_type, record.slice(offset..)))
    }

    /// Write a payload under the given type, returning its content hash
    ///
    /// Idempotent: an object that already exists is not rewritten.
    pub fn put(&self, object_type: ObjectType, payload: &[u8]) -> anyhow::Result<ObjectId> {
        let object_id = hash_record(object_type, payload);
        let object_path = self.path.join(object_id.to_path());

        if object_path.exists() {
            return Ok(object_id);
        }

        std::fs::create_dir_all(
            object_path
                .parent()
                .context(format!("Invalid object path {}", object_path.display()))?,
        )
        .context(format!(
            "Unable to create object directory {}",
            object_path.display()
        ))?;

        self.write_object(object_path, encode_record(object_type, payload))?;
        tracing::debug!(oid = %object_id, kind = %object_type, size = payload.len(), "stored object");

        Ok(object_id)
    }

    pub fn store(&self, object: &impl Object) -> anyhow::Result<ObjectId> {
        let payload = object.serialize()?;
        self.put(object.object_type(), &payload)
    }

    /// Lazy handle that decodes the object on first access
    pub fn handle(&self, object_id: ObjectId) -> ObjectHandle<'_> {
        ObjectHandle::new(object_id, self)
    }

    pub fn parse_object(&self, object_id: &ObjectId) -> anyhow::Result<ObjectBox> {
        let (object_type, payload) = self.get(object_id)?;
        ObjectBox::decode(object_type, Cursor::new(payload))
            .with_context(|| format!("Unable to decode {object_type} {object_id}"))
    }

    pub fn parse_object_as_blob(&self, object_id: &ObjectId) -> anyhow::Result<Option<Blob>> {
        match self.get(object_id)? {
            (ObjectType::Blob, payload) => Ok(Some(Blob::deserialize(Cursor::new(payload))?)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_tree(&self, object_id: &ObjectId) -> anyhow::Result<Option<Tree>> {
        match self.get(object_id)? {
            (ObjectType::Tree, payload) => Ok(Some(Tree::deserialize(Cursor::new(payload))?)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_commit(&self, object_id: &ObjectId) -> anyhow::Result<Option<Commit>> {
        match self.get(object_id)? {
            (ObjectType::Commit, payload) => Ok(Some(Commit::deserialize(Cursor::new(payload))?)),
            _ => Ok(None),
        }
    }

    /// Resolve a tree-ish (tree, commit, or tag pointing at either) to a tree id
    pub fn peel_to_tree(&self, object_id: &ObjectId) -> anyhow::Result<ObjectId> {
        let handle = self.handle(*object_id);
        match handle.decoded()? {
            ObjectBox::Tree(_) => Ok(*object_id),
            ObjectBox::Commit(commit) => Ok(*commit.tree_oid()),
            ObjectBox::Tag(tag) => self.peel_to_tree(tag.object()),
            ObjectBox::Blob(_) => Err(anyhow::anyhow!("{object_id} is a blob, not a tree-ish")),
        }
    }

    /// Resolve a commit-ish (commit, or tag pointing at one) to a commit id
    pub fn peel_to_commit(&self, object_id: &ObjectId) -> anyhow::Result<ObjectId> {
        let handle = self.handle(*object_id);
        match handle.decoded()? {
            ObjectBox::Commit(_) => Ok(*object_id),
            ObjectBox::Tag(tag) => self.peel_to_commit(tag.object()),
            other => Err(anyhow::anyhow!(
                "{object_id} is a {}, not a commit",
                other.object_type()
            )),
        }
    }

    /// Lazily walk every entry below a tree in pre-order
    pub fn traverse(&self, tree_oid: ObjectId) -> TreeWalker<'_> {
        TreeWalker::new(self, tree_oid)
    }

    /// Every leaf (blob, symlink, gitlink) below a tree-ish, keyed by full path
    pub fn flatten_tree(&self, tree_ish: &ObjectId) -> anyhow::Result<BTreeMap<PathBuf, DatabaseEntry>> {
        let tree_oid = self.peel_to_tree(tree_ish)?;
        let mut leaves = BTreeMap::new();

        for item in self.traverse(tree_oid) {
            let (path, entry) = item?;
            if !entry.mode.is_tree() {
                leaves.insert(path, entry.database_entry());
            }
        }

        Ok(leaves)
    }

    fn read_object(&self, object_path: PathBuf) -> anyhow::Result<Bytes> {
        let object_content = std::fs::read(&object_path).context(format!(
            "Unable to read object file {}",
            object_path.display()
        ))?;

        Self::decompress(object_content.into())
    }

    fn write_object(&self, object_path: PathBuf, object_content: Bytes) -> anyhow::Result<()> {
        let object_dir = object_path
            .parent()
            .context(format!("Invalid object path {}", object_path.display()))?;
        let temp_object_path = object_dir.join(Self::generate_temp_name());

        let object_content = Self::compress(object_content)?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_object_path)
            .context(format!(
                "Unable to open object file {}",
                temp_object_path.display()
            ))?;

        file.write_all(&object_content).context(format!(
            "Unable to write object file {}",
            temp_object_path.display()
        ))?;

        // rename the temp file to the object file to make it atomic
        std::fs::rename(&temp_object_path, &object_path).context(format!(
            "Unable to rename object file to {}",
            object_path.display()
        ))?;

        Ok(())
    }

    fn compress(data: Bytes) -> anyhow::Result<Bytes> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(&data)
            .context("Unable to compress object content")?;

        encoder
            .finish()
            .map(|compressed_content| compressed_content.into())
            .context("Unable to finish compressing object content")
    }

    fn decompress(data: Bytes) -> anyhow::Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(&*data);
        let mut decompressed_content = Vec::new();
        decoder
            .read_to_end(&mut decompressed_content)
            .context("Unable to decompress object content")?;

        Ok(decompressed_content.into())
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", rand::random::<u32>())
    }

    /// Find all objects whose hex id starts with the given prefix
    ///
    /// Used to expand abbreviated ids. Several matches mean the prefix is
    /// ambiguous; the caller decides how to report that.
    pub fn find_objects_by_prefix(&self, prefix: &str) -> anyhow::Result<Vec<ObjectId>> {
        let mut matches = Vec::new();

        let dirs = if prefix.len() >= 2 {
            vec![prefix[..2].to_string()]
        } else {
            (0..=255u8).map(|i| format!("{i:02x}")).collect()
        };

        for dir_name in dirs {
            let dir_path = self.path.join(&dir_name);
            if !dir_path.is_dir() {
                continue;
            }

            for entry in std::fs::read_dir(&dir_path)? {
                let file_name = entry?.file_name();
                let full_oid = format!("{}{}", dir_name, file_name.to_string_lossy());

                if full_oid.starts_with(prefix)
                    && let Ok(oid) = ObjectId::try_parse(&full_oid)
                {
                    matches.push(oid);
                }
            }
        }

        matches.sort();
        Ok(matches)
    }

    pub fn get_object_type(&self, object_id: &ObjectId) -> anyhow::Result<ObjectType> {
        let (object_type, _) = self.get(object_id)?;
        Ok(object_type)
    }
}
