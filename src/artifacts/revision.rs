//! Revision expressions
//!
//! Supported forms:
//! - Ref names: `master`, `refs/heads/topic`, `origin/master`, `HEAD`
//! - Aliases: `@` (resolves to `HEAD`)
//! - Full or abbreviated (4+ hex digits) object ids, tried after refs
//! - Parent notation: `<revision>^`
//! - Ancestor notation: `<revision>~<n>`

use anyhow::Context;

pub const PARENT_REGEX: &str = r"^(.+)\^$";
pub const ANCESTOR_REGEX: &str = r"^(.+)\~(\d+)$";
pub const REF_ALIASES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "@" => "HEAD",
};

/// Minimum length of an abbreviated object id
pub const MIN_ABBREVIATED_OID: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    /// A ref name or an object id, decided during resolution
    Name(String),
    /// The first parent of a revision
    Parent(Box<Revision>),
    /// The Nth first-parent ancestor of a revision
    Ancestor(Box<Revision>, usize),
}

impl Revision {
    pub fn try_parse(revision: &str) -> anyhow::Result<Revision> {
        if revision.trim().is_empty() {
            anyhow::bail!("empty revision");
        }

        let parent = regex::Regex::new(PARENT_REGEX)
            .with_context(|| format!("invalid parent regex: {PARENT_REGEX}"))?;
        if let Some(caps) = parent.captures(revision) {
            return Ok(Revision::Parent(Box::new(Self::try_parse(&caps[1])?)));
        }

        let ancestor = regex::Regex::new(ANCESTOR_REGEX)
            .with_context(|| format!("invalid ancestor regex: {ANCESTOR_REGEX}"))?;
        if let Some(caps) = ancestor.captures(revision) {
            let generations: usize = caps[2]
                .parse()
                .with_context(|| format!("failed to parse generations in revision: {revision}"))?;
            return Ok(Revision::Ancestor(
                Box::new(Self::try_parse(&caps[1])?),
                generations,
            ));
        }

        let resolved_name = *REF_ALIASES.get(revision).unwrap_or(&revision);
        Ok(Revision::Name(resolved_name.to_string()))
    }

    pub fn looks_like_oid(name: &str) -> bool {
        name.len() >= MIN_ABBREVIATED_OID
            && name.len() <= crate::artifacts::objects::OBJECT_ID_LENGTH
            && name.chars().all(|c| c.is_ascii_hexdigit())
    }
}
