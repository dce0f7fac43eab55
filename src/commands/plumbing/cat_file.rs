use crate::areas::repository::Repository;
use crate::artifacts::objects::object::ObjectBox;

impl Repository {
    /// Print an object: trees one entry per line, everything else as raw bytes
    pub fn cat_file(&self, name: &str) -> anyhow::Result<()> {
        let object_id = self.refs().resolve_name(name, self.database())?;
        let object = self.database().handle(object_id);

        match object.decoded()? {
            tree @ ObjectBox::Tree(_) => writeln!(self.writer(), "{}", tree.display())?,
            _ => self.writer().write_all(object.payload()?)?,
        }

        Ok(())
    }
}
