use crate::areas::repository::Repository;
use anyhow::Context;

impl Repository {
    /// List a tree-ish; `recursive` descends into subtrees and prints leaves only
    pub fn ls_tree(&self, name: &str, recursive: bool) -> anyhow::Result<()> {
        let object_id = self.refs().resolve_name(name, self.database())?;
        let tree_oid = self.database().peel_to_tree(&object_id)?;

        if recursive {
            for item in self.database().traverse(tree_oid) {
                let (path, entry) = item?;
                if entry.mode.is_tree() {
                    continue;
                }
                writeln!(
                    self.writer(),
                    "{} {} {}\t{}",
                    entry.mode,
                    entry.object_type(),
                    entry.oid,
                    path.display()
                )?;
            }
            return Ok(());
        }

        let tree = self
            .database()
            .parse_object_as_tree(&tree_oid)?
            .with_context(|| format!("{tree_oid} is not a tree"))?;
        for entry in tree.entries() {
            writeln!(
                self.writer(),
                "{} {} {}\t{}",
                entry.mode,
                entry.object_type(),
                entry.oid,
                entry.name
            )?;
        }

        Ok(())
    }
}
