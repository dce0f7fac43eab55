use crate::areas::repository::Repository;
use crate::artifacts::objects::object::Object;
use std::path::Path;

impl Repository {
    pub fn hash_object(&self, object_path: &Path, write: bool) -> anyhow::Result<()> {
        let object_path = self.relative_path(object_path)?;
        let blob = self.workspace().parse_blob(&object_path)?;

        let object_id = if write {
            self.database().store(&blob)?
        } else {
            blob.object_id()?
        };

        writeln!(self.writer(), "{object_id}")?;

        Ok(())
    }
}
