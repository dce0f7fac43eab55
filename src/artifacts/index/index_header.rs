use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, VERSION};
use crate::artifacts::objects::object::{Packable, Unpackable};
use anyhow::Context;
use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt};
use bytes::Bytes;
use std::io::{BufRead, Write};

/// `DIRC`, the format version and the number of entries that follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub(crate) entries_count: u32,
}

impl IndexHeader {
    pub(crate) fn with_entries(entries_count: u32) -> Self {
        IndexHeader { entries_count }
    }
}

impl Packable for IndexHeader {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.write_all(SIGNATURE.as_bytes())?;
        bytes.write_u32::<NetworkEndian>(VERSION)?;
        bytes.write_u32::<NetworkEndian>(self.entries_count)?;

        Ok(Bytes::from(bytes))
    }
}

impl Unpackable for IndexHeader {
    /// Only version 2 files signed `DIRC` are accepted
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut bytes = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut bytes)
            .context("Index header is truncated")?;

        if &bytes[0..4] != SIGNATURE.as_bytes() {
            anyhow::bail!("Invalid index file signature");
        }
        let version = NetworkEndian::read_u32(&bytes[4..8]);
        if version != VERSION {
            anyhow::bail!("Unsupported index file version: {version}");
        }

        Ok(IndexHeader {
            entries_count: NetworkEndian::read_u32(&bytes[8..12]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn headers_are_twelve_bytes_in_network_order() {
        let bytes = IndexHeader::with_entries(3).serialize().unwrap();

        assert_eq!(&bytes[..], b"DIRC\0\0\0\x02\0\0\0\x03");
        assert_eq!(
            IndexHeader::deserialize(&bytes[..]).unwrap(),
            IndexHeader::with_entries(3)
        );
    }

    #[rstest]
    #[case(b"DIRX\0\0\0\x02\0\0\0\0")]
    #[case(b"DIRC\0\0\0\x03\0\0\0\0")]
    #[case(b"DIRC\0\0")]
    fn foreign_headers_are_rejected(#[case] bytes: &[u8]) {
        assert!(IndexHeader::deserialize(bytes).is_err());
    }
}
