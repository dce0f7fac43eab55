//! Rename detection
//!
//! A deleted path and an added path are paired into a rename when:
//! - both hold the same content (exact match, always paired), or
//! - both are regular files whose similarity score reaches the threshold.
//!
//! The score counts the bytes of lines the two versions share (as a
//! multiset, so reordered lines still count) and divides by the size of the
//! larger version. Candidates are paired greedily, best score first, each
//! path taking part in at most one rename.

use crate::artifacts::diff::{ChangeRecord, ChangeType, Diffable};
use crate::artifacts::index::entry_mode::{EntryKind, EntryMode};
use crate::artifacts::index::index_entry::path_key;
use std::cmp::Reverse;
use std::collections::HashMap;

/// Above this many deletions or additions only exact renames are searched
pub const NEAR_RENAME_LIMIT: usize = 1000;

/// Similarity of two contents as a percentage
pub fn similarity(old: &[u8], new: &[u8]) -> u8 {
    let larger = old.len().max(new.len());
    if larger == 0 {
        return 100;
    }

    let mut old_lines: HashMap<&[u8], usize> = HashMap::new();
    for line in old.split_inclusive(|byte| *byte == b'\n') {
        *old_lines.entry(line).or_default() += 1;
    }

    let mut common = 0;
    for line in new.split_inclusive(|byte| *byte == b'\n') {
        if let Some(count) = old_lines.get_mut(line)
            && *count > 0
        {
            *count -= 1;
            common += line.len();
        }
    }

    (common * 100 / larger) as u8
}

/// Pair deletions with additions, replacing each pair by one rename record
pub fn detect_renames(
    records: Vec<ChangeRecord>,
    old: &dyn Diffable,
    new: &dyn Diffable,
    threshold: u8,
) -> anyhow::Result<Vec<ChangeRecord>> {
    let deleted = indices_of(&records, ChangeType::Deleted);
    let added = indices_of(&records, ChangeType::Added);
    if deleted.is_empty() || added.is_empty() {
        return Ok(records);
    }

    let mut pairs: Vec<(usize, usize, u8)> = Vec::new();
    let mut paired_old = vec![false; records.len()];
    let mut paired_new = vec![false; records.len()];

    for &new_index in &added {
        let new_record = &records[new_index];
        let exact = deleted.iter().find(|&&old_index| {
            let old_record = &records[old_index];
            !paired_old[old_index]
                && old_record.old_oid == new_record.new_oid
                && kind(old_record.old_mode) == kind(new_record.new_mode)
                && kind(new_record.new_mode) != Some(EntryKind::Gitlink)
        });
        if let Some(&old_index) = exact {
            paired_old[old_index] = true;
            paired_new[new_index] = true;
            pairs.push((old_index, new_index, 100));
        }
    }

    let remaining_old = unpaired_files(&records, &deleted, &paired_old, |r| r.old_mode);
    let remaining_new = unpaired_files(&records, &added, &paired_new, |r| r.new_mode);

    if !remaining_old.is_empty()
        && !remaining_new.is_empty()
        && remaining_old.len() <= NEAR_RENAME_LIMIT
        && remaining_new.len() <= NEAR_RENAME_LIMIT
    {
        let old_contents = remaining_old
            .iter()
            .map(|&index| {
                let record = &records[index];
                let entry = record.old_entry().ok_or_else(|| anyhow::anyhow!("deleted record without entry"))?;
                old.content(&record.path, &entry)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let new_contents = remaining_new
            .iter()
            .map(|&index| {
                let record = &records[index];
                let entry = record.new_entry().ok_or_else(|| anyhow::anyhow!("added record without entry"))?;
                new.content(&record.path, &entry)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut candidates = Vec::new();
        for (i, &old_index) in remaining_old.iter().enumerate() {
            for (j, &new_index) in remaining_new.iter().enumerate() {
                let score = similarity(&old_contents[i], &new_contents[j]);
                if score >= threshold {
                    candidates.push((Reverse(score), old_index, new_index));
                }
            }
        }
        candidates.sort_by_cached_key(|(score, old_index, new_index)| {
            (
                *score,
                path_key(&records[*new_index].path),
                path_key(&records[*old_index].path),
            )
        });

        for (Reverse(score), old_index, new_index) in candidates {
            if paired_old[old_index] || paired_new[new_index] {
                continue;
            }
            paired_old[old_index] = true;
            paired_new[new_index] = true;
            pairs.push((old_index, new_index, score));
        }
    }

    if pairs.is_empty() {
        return Ok(records);
    }

    let mut renames = pairs
        .iter()
        .map(|&(old_index, new_index, score)| {
            let old_record = &records[old_index];
            let new_record = &records[new_index];
            ChangeRecord {
                path: new_record.path.clone(),
                change_type: ChangeType::Renamed,
                old_mode: old_record.old_mode,
                new_mode: new_record.new_mode,
                old_oid: old_record.old_oid,
                new_oid: new_record.new_oid,
                similarity: Some(score),
                old_path: Some(old_record.path.clone()),
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(renames = renames.len(), "paired renames");

    let mut result = records
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !paired_old[*index] && !paired_new[*index])
        .map(|(_, record)| record)
        .collect::<Vec<_>>();
    result.append(&mut renames);

    Ok(result)
}

fn indices_of(records: &[ChangeRecord], change_type: ChangeType) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.change_type == change_type)
        .map(|(index, _)| index)
        .collect()
}

fn unpaired_files(
    records: &[ChangeRecord],
    indices: &[usize],
    paired: &[bool],
    mode: impl Fn(&ChangeRecord) -> Option<EntryMode>,
) -> Vec<usize> {
    indices
        .iter()
        .copied()
        .filter(|&index| !paired[index] && kind(mode(&records[index])) == Some(EntryKind::File))
        .collect()
}

fn kind(mode: Option<EntryMode>) -> Option<EntryKind> {
    mode.map(|mode| mode.kind())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::database::database_entry::DatabaseEntry;
    use crate::artifacts::diff::LeafSet;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::blob::Blob;
    use crate::artifacts::objects::object::Object;
    use crate::artifacts::objects::object_id::ObjectId;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::path::{Path, PathBuf};

    /// Endpoint serving content straight from memory
    struct Contents(HashMap<ObjectId, Bytes>);

    impl Contents {
        fn new(files: &[&str]) -> Self {
            Contents(
                files
                    .iter()
                    .map(|content| {
                        (
                            Blob::from(*content).object_id().unwrap(),
                            Bytes::copy_from_slice(content.as_bytes()),
                        )
                    })
                    .collect(),
            )
        }
    }

    impl Diffable for Contents {
        fn tree_oid(&self) -> anyhow::Result<Option<ObjectId>> {
            Ok(None)
        }

        fn leaf_entries(&self) -> anyhow::Result<LeafSet> {
            Ok(LeafSet::default())
        }

        fn content(&self, _path: &Path, entry: &DatabaseEntry) -> anyhow::Result<Bytes> {
            self.0
                .get(&entry.oid)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("missing"))
        }
    }

    fn file(content: &str) -> DatabaseEntry {
        DatabaseEntry::new(
            Blob::from(content).object_id().unwrap(),
            EntryMode::File(FileMode::Regular),
        )
    }

    fn deleted(path: &str, content: &str) -> ChangeRecord {
        ChangeRecord::from_entries(PathBuf::from(path), Some(&file(content)), None).unwrap()
    }

    fn added(path: &str, content: &str) -> ChangeRecord {
        ChangeRecord::from_entries(PathBuf::from(path), None, Some(&file(content))).unwrap()
    }

    #[rstest]
    #[case("", "", 100)]
    #[case("a\nb\n", "a\nb\n", 100)]
    #[case("a\nb\n", "b\na\n", 100)]
    #[case("a\nb\n", "c\nd\n", 0)]
    #[case("one\ntwo\n", "one\nthree\n", 40)]
    fn scores_shared_lines(#[case] old: &str, #[case] new: &str, #[case] expected: u8) {
        assert_eq!(similarity(old.as_bytes(), new.as_bytes()), expected);
    }

    #[test]
    fn exact_content_moves_are_always_renames() {
        let content = "same content\n";
        let endpoint = Contents::new(&[content]);

        let records = detect_renames(
            vec![deleted("old.txt", content), added("new.txt", content)],
            &endpoint,
            &endpoint,
            100,
        )
        .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].change_type, ChangeType::Renamed);
        assert_eq!(records[0].old_path, Some(PathBuf::from("old.txt")));
        assert_eq!(records[0].similarity, Some(100));
    }

    #[test]
    fn near_matches_respect_the_threshold() {
        let old_content = "line 1\nline 2\nline 3\nline 4\n";
        let new_content = "line 1\nline 2\nline 3\nchanged\n";
        let endpoint = Contents::new(&[old_content, new_content]);
        let changes = vec![deleted("a.txt", old_content), added("b.txt", new_content)];

        let paired = detect_renames(changes.clone(), &endpoint, &endpoint, 50).unwrap();
        assert_eq!(paired.len(), 1);
        assert_eq!(paired[0].change_type, ChangeType::Renamed);

        let unpaired = detect_renames(changes, &endpoint, &endpoint, 90).unwrap();
        assert_eq!(unpaired.len(), 2);
    }
}
