//! Annotated tag object
//!
//! ```text
//! object <sha>
//! type <object-type>
//! tag <name>
//! tagger <name> <email> <timestamp> <timezone>
//!
//! <message>
//! ```

use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use derive_new::new;
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Tag {
    object: ObjectId,
    target_type: ObjectType,
    name: String,
    tagger: Option<Author>,
    message: String,
}

impl Tag {
    pub fn object(&self) -> &ObjectId {
        &self.object
    }

    pub fn target_type(&self) -> ObjectType {
        self.target_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tagger(&self) -> Option<&Author> {
        self.tagger.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Packable for Tag {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        Ok(Bytes::from(self.display()))
    }
}

impl Unpackable for Tag {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        let (headers, message) = content
            .split_once("\n\n")
            .unwrap_or((content.as_str(), ""));

        let mut object = None;
        let mut target_type = None;
        let mut name = None;
        let mut tagger = None;

        for line in headers.lines() {
            let (key, value) = line
                .split_once(' ')
                .context("Invalid tag object: malformed header line")?;
            match key {
                "object" => object = Some(ObjectId::try_parse(value)?),
                "type" => target_type = Some(ObjectType::try_from(value)?),
                "tag" => name = Some(value.to_string()),
                "tagger" => tagger = Some(Author::try_from(value)?),
                _ => {}
            }
        }

        Ok(Tag::new(
            object.context("Invalid tag object: missing object line")?,
            target_type.context("Invalid tag object: missing type line")?,
            name.context("Invalid tag object: missing tag line")?,
            tagger,
            message.to_string(),
        ))
    }
}

impl Object for Tag {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn display(&self) -> String {
        let mut lines = vec![
            format!("object {}", self.object),
            format!("type {}", self.target_type),
            format!("tag {}", self.name),
        ];
        if let Some(tagger) = &self.tagger {
            lines.push(format!("tagger {}", tagger.display()));
        }
        lines.push(String::new());
        lines.push(self.message.clone());

        lines.join("\n")
    }
}
