//! `.gitmodules` configuration
//!
//! Only `[submodule "<name>"]` sections are read; every other section is
//! skipped. Keys are case-insensitive, values may be double-quoted, and
//! lines starting with `#` or `;` are comments.

use crate::areas::database::Database;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use regex::Regex;
use std::path::{Path, PathBuf};

pub const GITMODULES: &str = ".gitmodules";

const SECTION_REGEX: &str = r#"^\[\s*([A-Za-z][A-Za-z0-9.-]*)(?:\s+"([^"]*)")?\s*\]$"#;
const ENTRY_REGEX: &str = r"^([A-Za-z][A-Za-z0-9-]*)\s*=\s*(.*)$";

/// One `[submodule "<name>"]` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleSection {
    pub name: String,
    /// Location of the gitlink, relative to the repository root
    pub path: PathBuf,
    pub url: String,
    /// Branch followed when updating to the latest revision
    pub branch: Option<String>,
}

#[derive(Debug, Default)]
struct PartialSection {
    name: String,
    path: Option<String>,
    url: Option<String>,
    branch: Option<String>,
}

impl PartialSection {
    fn finish(self) -> anyhow::Result<SubmoduleSection> {
        let path = self
            .path
            .with_context(|| format!("submodule '{}' has no path", self.name))?;
        let url = self
            .url
            .with_context(|| format!("submodule '{}' has no url", self.name))?;

        Ok(SubmoduleSection {
            name: self.name,
            path: PathBuf::from(path.trim_end_matches('/')),
            url,
            branch: self.branch,
        })
    }
}

/// Parsed `.gitmodules`, sections in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmoduleConfig {
    sections: Vec<SubmoduleSection>,
}

impl SubmoduleConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let section_regex = Regex::new(SECTION_REGEX)?;
        let entry_regex = Regex::new(ENTRY_REGEX)?;

        let mut sections = Vec::new();
        let mut current: Option<PartialSection> = None;

        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = section_regex.captures(line) {
                if let Some(section) = current.take() {
                    sections.push(section.finish()?);
                }
                if header[1].eq_ignore_ascii_case("submodule")
                    && let Some(name) = header.get(2)
                {
                    current = Some(PartialSection {
                        name: name.as_str().to_string(),
                        ..Default::default()
                    });
                }
                continue;
            }

            let entry = entry_regex
                .captures(line)
                .with_context(|| format!("{GITMODULES}:{}: cannot parse '{line}'", number + 1))?;
            let Some(section) = current.as_mut() else {
                continue;
            };

            let value = unquote(&entry[2]);
            match entry[1].to_ascii_lowercase().as_str() {
                "path" => section.path = Some(value),
                "url" => section.url = Some(value),
                "branch" => section.branch = Some(value),
                _ => {}
            }
        }

        if let Some(section) = current.take() {
            sections.push(section.finish()?);
        }

        for (index, section) in sections.iter().enumerate() {
            if sections[..index].iter().any(|other| other.path == section.path) {
                anyhow::bail!("path '{}' is listed by more than one submodule", section.path.display());
            }
        }

        Ok(SubmoduleConfig { sections })
    }

    /// Configuration recorded in the root tree of `commit`; empty without a `.gitmodules`
    pub fn at_commit(database: &Database, commit: &ObjectId) -> anyhow::Result<Self> {
        let tree_oid = database.peel_to_tree(commit)?;
        let tree = database
            .parse_object_as_tree(&tree_oid)?
            .with_context(|| format!("{tree_oid} is not a tree"))?;

        let Some(entry) = tree.entry(GITMODULES) else {
            return Ok(SubmoduleConfig::default());
        };
        let blob = database
            .parse_object_as_blob(&entry.oid)?
            .with_context(|| format!("{GITMODULES} in {commit} is not a file"))?;
        let text = std::str::from_utf8(blob.content())
            .with_context(|| format!("{GITMODULES} in {commit} is not valid UTF-8"))?;

        Self::parse(text).with_context(|| format!("invalid {GITMODULES} in {commit}"))
    }

    pub fn sections(&self) -> &[SubmoduleSection] {
        &self.sections
    }

    pub fn by_path(&self, path: &Path) -> Option<&SubmoduleSection> {
        self.sections.iter().find(|section| section.path == path)
    }
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|value| value.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}
