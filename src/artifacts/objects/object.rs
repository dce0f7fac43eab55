use crate::artifacts::objects::OBJECT_ID_RAW_LENGTH;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use anyhow::Result;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::BufRead;

/// Serialize an object's payload (the bytes after the `<type> <size>\0` header)
pub trait Packable {
    fn serialize(&self) -> Result<Bytes>;
}

/// Decode an object's payload; the record header has already been consumed
pub trait Unpackable {
    fn deserialize(reader: impl BufRead) -> Result<Self>
    where
        Self: Sized;
}

pub trait Object: Packable {
    fn object_type(&self) -> ObjectType;

    fn display(&self) -> String;

    fn object_id(&self) -> Result<ObjectId> {
        let payload = self.serialize()?;
        Ok(hash_record(self.object_type(), &payload))
    }
}

/// Full loose-object record: header followed by the payload
pub fn encode_record(object_type: ObjectType, payload: &[u8]) -> Bytes {
    let header = object_type.header(payload.len());
    let mut record = Vec::with_capacity(header.len() + payload.len());
    record.extend_from_slice(header.as_bytes());
    record.extend_from_slice(payload);

    Bytes::from(record)
}

/// Hash of the uncompressed `<type> <size>\0<payload>` record
pub fn hash_record(object_type: ObjectType, payload: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(object_type.header(payload.len()).as_bytes());
    hasher.update(payload);

    let mut raw = [0u8; OBJECT_ID_RAW_LENGTH];
    raw.copy_from_slice(&hasher.finalize());
    ObjectId::from_raw(raw)
}

#[derive(Debug, Clone)]
pub enum ObjectBox {
    Blob(Box<Blob>),
    Tree(Box<Tree>),
    Commit(Box<Commit>),
    Tag(Box<Tag>),
}

impl ObjectBox {
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectBox::Blob(_) => ObjectType::Blob,
            ObjectBox::Tree(_) => ObjectType::Tree,
            ObjectBox::Commit(_) => ObjectType::Commit,
            ObjectBox::Tag(_) => ObjectType::Tag,
        }
    }

    pub fn display(&self) -> String {
        match self {
            ObjectBox::Blob(blob) => blob.display(),
            ObjectBox::Tree(tree) => tree.display(),
            ObjectBox::Commit(commit) => commit.display(),
            ObjectBox::Tag(tag) => tag.display(),
        }
    }

    pub fn decode(object_type: ObjectType, reader: impl BufRead) -> Result<Self> {
        Ok(match object_type {
            ObjectType::Blob => ObjectBox::Blob(Box::new(Blob::deserialize(reader)?)),
            ObjectType::Tree => ObjectBox::Tree(Box::new(Tree::deserialize(reader)?)),
            ObjectType::Commit => ObjectBox::Commit(Box::new(Commit::deserialize(reader)?)),
            ObjectType::Tag => ObjectBox::Tag(Box::new(Tag::deserialize(reader)?)),
        })
    }
}
