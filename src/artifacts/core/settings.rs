//! Repository settings
//!
//! Settings travel with the [`Repository`](crate::areas::repository::Repository)
//! value; nothing is read from process-wide state after construction.

use crate::artifacts::objects::commit::Author;
use anyhow::Context;

/// Default similarity (percent) above which a deletion/addition pair is a rename
pub const DEFAULT_RENAME_THRESHOLD: u8 = 50;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Pair deletions and additions into renames when diffing
    pub detect_renames: bool,
    /// Minimum similarity score (0-100) for a near-match rename
    pub rename_threshold: u8,
    /// Author used by commits that are not given one explicitly
    pub author: Option<Author>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            detect_renames: true,
            rename_threshold: DEFAULT_RENAME_THRESHOLD,
            author: None,
        }
    }
}

impl Settings {
    /// Read settings from the environment
    ///
    /// - `BITMOD_RENAME_THRESHOLD`: similarity percentage (0-100)
    /// - `BITMOD_NO_RENAMES`: disable rename detection when set
    /// - `GIT_AUTHOR_NAME` / `GIT_AUTHOR_EMAIL` / `GIT_AUTHOR_DATE`: default author
    pub fn load_from_env() -> anyhow::Result<Self> {
        let mut settings = Settings::default();

        if let Ok(threshold) = std::env::var("BITMOD_RENAME_THRESHOLD") {
            let threshold = threshold
                .trim()
                .parse::<u8>()
                .context("BITMOD_RENAME_THRESHOLD must be an integer")?;
            settings = settings.with_rename_threshold(threshold)?;
        }
        settings.detect_renames = std::env::var_os("BITMOD_NO_RENAMES").is_none();
        settings.author = Author::load_from_env().ok();

        Ok(settings)
    }

    pub fn with_rename_threshold(mut self, threshold: u8) -> anyhow::Result<Self> {
        if threshold > 100 {
            anyhow::bail!("rename threshold must be within 0-100, got {threshold}");
        }
        self.rename_threshold = threshold;
        Ok(self)
    }

    pub fn with_author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }

    pub fn without_renames(mut self) -> Self {
        self.detect_renames = false;
        self
    }
}
