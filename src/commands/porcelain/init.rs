use crate::areas::refs::DEFAULT_BRANCH;
use crate::areas::repository::Repository;
use anyhow::Context;
use std::fs;

impl Repository {
    /// Create an empty `.git` layout; running it again on a repository is harmless
    pub fn init(&self) -> anyhow::Result<()> {
        fs::create_dir_all(self.database().objects_path())
            .context("Failed to create .git/objects directory")?;

        fs::create_dir_all(self.refs().heads_path())
            .context("Failed to create .git/refs/heads directory")?;

        fs::create_dir_all(self.refs().refs_path().join("tags"))
            .context("Failed to create .git/refs/tags directory")?;

        if !self.refs().head_path().exists() {
            self.refs()
                .set_head_symbolic(&format!("refs/heads/{DEFAULT_BRANCH}"))
                .context("Failed to create initial HEAD reference")?;
        }

        tracing::info!(path = %self.path().display(), "initialized repository");
        writeln!(
            self.writer(),
            "Initialized empty Git repository in {}",
            self.git_dir().display()
        )?;

        Ok(())
    }
}
