use crate::areas::repository::Repository;
use crate::artifacts::core::error::RepositoryError;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::submodule::config::{SubmoduleConfig, SubmoduleSection};
use crate::artifacts::submodule::descriptor::SubmoduleDescriptor;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// The submodules one commit records, built fresh for every commit looked at
///
/// Disagreements between the tree and `.gitmodules` are kept as data instead
/// of failing the whole graph, so callers can report them per path.
#[derive(Debug, Clone, Default)]
pub struct SubmoduleGraph {
    descriptors: Vec<SubmoduleDescriptor>,
    stale_sections: Vec<SubmoduleSection>,
    unconfigured: Vec<SubmoduleDescriptor>,
}

impl SubmoduleGraph {
    pub fn at_commit(repository: &Repository, commit: &ObjectId) -> anyhow::Result<Self> {
        let database = repository.database();
        let config = SubmoduleConfig::at_commit(database, commit)?;

        let mut graph = SubmoduleGraph::default();
        let mut gitlinks = BTreeSet::new();

        for (path, entry) in database.flatten_tree(commit)? {
            if !entry.is_gitlink() {
                continue;
            }
            gitlinks.insert(path.clone());

            let descriptor = SubmoduleDescriptor::from_gitlink(path, entry.oid);
            match descriptor.clone().bind_with(&config, repository.path(), commit) {
                Ok(bound) => graph.descriptors.push(bound),
                Err(error) if is_inconsistent(&error) => graph.unconfigured.push(descriptor),
                Err(error) => return Err(error),
            }
        }

        graph.stale_sections = config
            .sections()
            .iter()
            .filter(|section| !gitlinks.contains(&section.path))
            .cloned()
            .collect();

        tracing::debug!(
            commit = %commit,
            submodules = graph.descriptors.len(),
            stale = graph.stale_sections.len(),
            unconfigured = graph.unconfigured.len(),
            "built submodule graph"
        );
        Ok(graph)
    }

    /// Bound descriptors in path order
    pub fn descriptors(&self) -> &[SubmoduleDescriptor] {
        &self.descriptors
    }

    /// Configuration sections whose path holds no gitlink
    pub fn stale_sections(&self) -> &[SubmoduleSection] {
        &self.stale_sections
    }

    /// Gitlinks no configuration section describes (left unbound)
    pub fn unconfigured(&self) -> &[SubmoduleDescriptor] {
        &self.unconfigured
    }

    pub fn get(&self, path: &Path) -> Option<&SubmoduleDescriptor> {
        self.descriptors.iter().find(|descriptor| descriptor.path() == path)
    }

    pub fn is_stale(&self, path: &Path) -> bool {
        self.stale_sections.iter().any(|section| section.path == path)
    }

    pub fn is_unconfigured(&self, path: &Path) -> bool {
        self.unconfigured.iter().any(|descriptor| descriptor.path() == path)
    }

    /// Every path the graph mentions, consistent or not
    pub fn paths(&self) -> BTreeSet<PathBuf> {
        self.descriptors
            .iter()
            .chain(&self.unconfigured)
            .map(|descriptor| descriptor.path().to_path_buf())
            .chain(self.stale_sections.iter().map(|section| section.path.clone()))
            .collect()
    }
}

fn is_inconsistent(error: &anyhow::Error) -> bool {
    matches!(
        RepositoryError::find(error),
        Some(RepositoryError::InconsistentSubmoduleConfig { .. })
    )
}
