//! Lazily decoded object handle
//!
//! A handle is just a hash plus a borrowed store. The object's type, size and
//! decoded form are read on first access and memoized for the handle's
//! lifetime. Two handles are equal when their hashes are.

use crate::areas::database::Database;
use crate::artifacts::objects::object::ObjectBox;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use bytes::Bytes;
use std::cell::OnceCell;
use std::io::Cursor;

#[derive(Debug)]
struct Loaded {
    object_type: ObjectType,
    payload: Bytes,
}

pub struct ObjectHandle<'db> {
    oid: ObjectId,
    database: &'db Database,
    loaded: OnceCell<Loaded>,
    decoded: OnceCell<ObjectBox>,
}

impl<'db> ObjectHandle<'db> {
    pub fn new(oid: ObjectId, database: &'db Database) -> Self {
        ObjectHandle {
            oid,
            database,
            loaded: OnceCell::new(),
            decoded: OnceCell::new(),
        }
    }

    pub fn oid(&self) -> &ObjectId {
        &self.oid
    }

    fn loaded(&self) -> anyhow::Result<&Loaded> {
        if let Some(loaded) = self.loaded.get() {
            return Ok(loaded);
        }

        let (object_type, payload) = self.database.get(&self.oid)?;
        Ok(self.loaded.get_or_init(|| Loaded {
            object_type,
            payload,
        }))
    }

    pub fn object_type(&self) -> anyhow::Result<ObjectType> {
        Ok(self.loaded()?.object_type)
    }

    pub fn size(&self) -> anyhow::Result<usize> {
        Ok(self.loaded()?.payload.len())
    }

    pub fn payload(&self) -> anyhow::Result<&Bytes> {
        Ok(&self.loaded()?.payload)
    }

    pub fn decoded(&self) -> anyhow::Result<&ObjectBox> {
        if let Some(decoded) = self.decoded.get() {
            return Ok(decoded);
        }

        let loaded = self.loaded()?;
        let decoded = ObjectBox::decode(loaded.object_type, Cursor::new(loaded.payload.clone()))?;
        Ok(self.decoded.get_or_init(|| decoded))
    }

    /// Decoded tree entries, or an error when the handle is not a tree
    pub fn as_tree(&self) -> anyhow::Result<&Tree> {
        match self.decoded()? {
            ObjectBox::Tree(tree) => Ok(tree),
            other => Err(anyhow::anyhow!(
                "{} is a {}, not a tree",
                self.oid,
                other.object_type()
            )),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }
}

impl PartialEq for ObjectHandle<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}

impl Eq for ObjectHandle<'_> {}

impl std::fmt::Debug for ObjectHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("oid", &self.oid)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
