//! Submodule synchronization
//!
//! [`RootModule::update`] brings every nested checkout in line with what
//! HEAD records. The set of paths to look at is the union of the submodules
//! of HEAD and of a previous commit (HEAD's first parent unless told
//! otherwise), so submodules that HEAD dropped are noticed too. What to do
//! with each path is always decided from what is actually on disk:
//!
//! - recorded by HEAD, not checked out: fetch and check out
//! - recorded by HEAD, checked out elsewhere: check out the recorded commit
//! - no longer recorded, still checked out: delete the checkout
//!
//! so running an update twice performs no work the second time. Each path
//! gets its own [`UpdateOutcome`]; one failing submodule never stops the
//! others.

use crate::areas::repository::Repository;
use crate::artifacts::core::error::RepositoryError;
use crate::artifacts::merge::ancestry::AncestorFinder;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::submodule::descriptor::SubmoduleDescriptor;
use crate::artifacts::submodule::fetcher::{ModuleFetcher, REMOTE_PREFIX};
use crate::artifacts::submodule::graph::SubmoduleGraph;
use anyhow::Context;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Also update the submodules of each submodule
    pub recursive: bool,
    /// Follow the configured branch's remote tip instead of the recorded commit
    pub to_latest_revision: bool,
    /// Report what would be done without touching anything
    pub dry_run: bool,
    /// Discard local changes in nested checkouts
    pub force: bool,
    /// Commit whose submodules are compared against HEAD's
    pub previous_commit: Option<ObjectId>,
    /// Checked between submodules; once set, the rest are reported as cancelled
    pub cancel: Option<Arc<AtomicBool>>,
}

impl UpdateOptions {
    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|cancel| cancel.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    Clone { url: String, commit: ObjectId },
    Checkout { from: Option<ObjectId>, to: ObjectId },
    Remove,
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannedAction::Clone { url, commit } => {
                write!(f, "clone {url} at {}", commit.to_short_oid())
            }
            PlannedAction::Checkout { from: Some(from), to } => {
                write!(f, "checkout {}..{}", from.to_short_oid(), to.to_short_oid())
            }
            PlannedAction::Checkout { from: None, to } => write!(f, "checkout {}", to.to_short_oid()),
            PlannedAction::Remove => write!(f, "remove"),
        }
    }
}

#[derive(Debug)]
pub enum UpdateOutcome {
    UpToDate,
    /// Dry run: the action that would have been applied
    Planned(PlannedAction),
    Applied(PlannedAction),
    Failed(anyhow::Error),
    Cancelled,
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOutcome::UpToDate => write!(f, "up to date"),
            UpdateOutcome::Planned(action) => write!(f, "would {action}"),
            UpdateOutcome::Applied(action) => write!(f, "{action}"),
            UpdateOutcome::Failed(error) => write!(f, "failed: {error:#}"),
            UpdateOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug)]
pub struct ModuleOutcome {
    /// Submodule path relative to the repository the update started from
    pub path: PathBuf,
    pub outcome: UpdateOutcome,
}

/// Outcomes in path order, nested submodules right after their parent
#[derive(Debug, Default)]
pub struct UpdateReport {
    outcomes: Vec<ModuleOutcome>,
}

impl UpdateReport {
    pub fn outcomes(&self) -> &[ModuleOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, path: &Path) -> Option<&UpdateOutcome> {
        self.outcomes
            .iter()
            .find(|module| module.path == path)
            .map(|module| &module.outcome)
    }

    /// Number of submodules actually changed on disk
    pub fn mutations(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|module| matches!(module.outcome, UpdateOutcome::Applied(_)))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &anyhow::Error)> {
        self.outcomes.iter().filter_map(|module| match &module.outcome {
            UpdateOutcome::Failed(error) => Some((module.path.as_path(), error)),
            _ => None,
        })
    }

    fn push(&mut self, path: PathBuf, outcome: UpdateOutcome) {
        self.outcomes.push(ModuleOutcome { path, outcome });
    }

    fn extend_nested(&mut self, prefix: &Path, nested: UpdateReport) {
        self.outcomes
            .extend(nested.outcomes.into_iter().map(|module| ModuleOutcome {
                path: prefix.join(module.path),
                outcome: module.outcome,
            }));
    }
}

/// The repository an update starts from, plus the means to fetch submodules
pub struct RootModule<'r> {
    repository: &'r Repository,
    fetcher: &'r dyn ModuleFetcher,
}

impl<'r> RootModule<'r> {
    pub fn new(repository: &'r Repository, fetcher: &'r dyn ModuleFetcher) -> Self {
        RootModule { repository, fetcher }
    }

    pub fn update(&self, options: &UpdateOptions) -> anyhow::Result<UpdateReport> {
        let mut report = UpdateReport::default();
        let Some(head) = self.repository.refs().read_head()? else {
            return Ok(report);
        };

        let previous = match options.previous_commit {
            Some(previous) => Some(previous),
            None => self.first_parent(&head)?,
        };
        let after = SubmoduleGraph::at_commit(self.repository, &head)?;
        let before = match previous {
            Some(previous) => SubmoduleGraph::at_commit(self.repository, &previous)?,
            None => SubmoduleGraph::default(),
        };

        let mut paths = after.paths();
        paths.extend(before.paths());

        for path in paths {
            if options.is_cancelled() {
                tracing::info!(path = %path.display(), "submodule update cancelled");
                report.push(path, UpdateOutcome::Cancelled);
                continue;
            }

            let outcome = self.update_path(&path, &after, options).unwrap_or_else(|error| {
                tracing::warn!(path = %path.display(), error = %format!("{error:#}"), "submodule update failed");
                UpdateOutcome::Failed(error)
            });
            let descend = options.recursive
                && !options.dry_run
                && !matches!(outcome, UpdateOutcome::Failed(_));
            report.push(path.clone(), outcome);

            if let Some(descriptor) = after.get(&path).filter(|_| descend) {
                match self.update_nested(descriptor, options) {
                    Ok(Some(nested)) => report.extend_nested(&path, nested),
                    Ok(None) => {}
                    Err(error) => report.push(
                        path.clone(),
                        UpdateOutcome::Failed(error.context("recursive update failed")),
                    ),
                }
            }
        }

        Ok(report)
    }

    fn first_parent(&self, commit: &ObjectId) -> anyhow::Result<Option<ObjectId>> {
        let commit = self
            .repository
            .database()
            .parse_object_as_commit(commit)?
            .with_context(|| format!("{commit} is not a commit"))?;
        Ok(commit.parent().copied())
    }

    fn update_path(
        &self,
        path: &Path,
        after: &SubmoduleGraph,
        options: &UpdateOptions,
    ) -> anyhow::Result<UpdateOutcome> {
        if after.is_stale(path) {
            return Err(RepositoryError::InconsistentSubmoduleConfig {
                path: path.to_path_buf(),
                reason: ".gitmodules lists a path the tree does not record as a gitlink".into(),
            }
            .into());
        }
        if after.is_unconfigured(path) {
            return Err(RepositoryError::InconsistentSubmoduleConfig {
                path: path.to_path_buf(),
                reason: "the tree records a gitlink that no .gitmodules section lists".into(),
            }
            .into());
        }

        match after.get(path) {
            Some(descriptor) if descriptor.is_checked_out()? => self.sync_module(descriptor, options),
            Some(descriptor) => self.clone_module(descriptor, options),
            None => self.remove_module(path, options),
        }
    }

    fn clone_module(
        &self,
        descriptor: &SubmoduleDescriptor,
        options: &UpdateOptions,
    ) -> anyhow::Result<UpdateOutcome> {
        let url = descriptor.url()?;
        if options.dry_run {
            return Ok(UpdateOutcome::Planned(PlannedAction::Clone {
                url,
                commit: *descriptor.commit(),
            }));
        }

        self.fetcher.fetch(&url, &descriptor.abspath()?)?;
        let module = descriptor.module(self.repository.settings())?;
        let branch = tracked_branch(descriptor, options)?;
        let target = target_commit(descriptor, &module, branch)?;
        ensure_available(&module, &target, &url)?;

        module.checkout(&target, branch, false)?;

        tracing::info!(path = %descriptor.path().display(), url = %url, commit = %target, "cloned submodule");
        Ok(UpdateOutcome::Applied(PlannedAction::Clone { url, commit: target }))
    }

    fn sync_module(
        &self,
        descriptor: &SubmoduleDescriptor,
        options: &UpdateOptions,
    ) -> anyhow::Result<UpdateOutcome> {
        let path = descriptor.path();
        let module = descriptor.module(self.repository.settings())?;
        let branch = tracked_branch(descriptor, options)?;

        if branch.is_some() && !options.dry_run {
            self.fetcher.fetch(&descriptor.url()?, &descriptor.abspath()?)?;
        }
        let target = target_commit(descriptor, &module, branch)?;
        let current = module.refs().read_head()?;
        let on_branch = match branch {
            Some(branch) => module.refs().current_ref()? == format!("refs/heads/{branch}"),
            None => true,
        };

        if current == Some(target) && on_branch {
            tracing::debug!(path = %path.display(), commit = %target, "submodule up to date");
            return Ok(UpdateOutcome::UpToDate);
        }

        let action = PlannedAction::Checkout {
            from: current,
            to: target,
        };
        if options.dry_run {
            return Ok(UpdateOutcome::Planned(action));
        }

        if !options.force && module.is_dirty()? {
            return Err(RepositoryError::DirtyNestedRepository(path.to_path_buf()).into());
        }
        if !module.database().exists(&target) {
            let url = descriptor.url()?;
            self.fetcher.fetch(&url, &descriptor.abspath()?)?;
            ensure_available(&module, &target, &url)?;
        }
        if let Some(branch) = branch
            && !options.force
            && let Some(local) = module.refs().read_ref(&format!("refs/heads/{branch}"))?
            && !AncestorFinder::new(module.database()).is_ancestor(&local, &target)?
        {
            anyhow::bail!(
                "local branch '{branch}' of submodule '{}' has diverged from {REMOTE_PREFIX}/{branch}",
                path.display()
            );
        }

        module.checkout(&target, branch, options.force)?;

        tracing::info!(path = %path.display(), action = %action, "updated submodule");
        Ok(UpdateOutcome::Applied(action))
    }

    fn remove_module(&self, path: &Path, options: &UpdateOptions) -> anyhow::Result<UpdateOutcome> {
        let workspace = self.repository.workspace();
        if !workspace.is_nested_repository(path) {
            return Ok(UpdateOutcome::UpToDate);
        }
        if !self.repository.load_index()?.entries_under_path(path).is_empty() {
            anyhow::bail!(
                "'{}' is still tracked by the parent repository; not deleting it",
                path.display()
            );
        }

        if options.dry_run {
            return Ok(UpdateOutcome::Planned(PlannedAction::Remove));
        }
        if !options.force && self.repository.nested(path)?.is_dirty()? {
            return Err(RepositoryError::DirtyNestedRepository(path.to_path_buf()).into());
        }

        workspace.remove_path(path)?;
        workspace.prune_empty_parents(path)?;

        tracing::info!(path = %path.display(), "removed submodule checkout");
        Ok(UpdateOutcome::Applied(PlannedAction::Remove))
    }

    fn update_nested(
        &self,
        descriptor: &SubmoduleDescriptor,
        options: &UpdateOptions,
    ) -> anyhow::Result<Option<UpdateReport>> {
        if !descriptor.is_checked_out()? {
            return Ok(None);
        }

        let module = descriptor.module(self.repository.settings())?;
        let nested_options = UpdateOptions {
            previous_commit: None,
            ..options.clone()
        };
        RootModule::new(&module, self.fetcher)
            .update(&nested_options)
            .map(Some)
    }
}

/// Branch to follow, only when updating to the latest revision
fn tracked_branch<'d>(
    descriptor: &'d SubmoduleDescriptor,
    options: &UpdateOptions,
) -> anyhow::Result<Option<&'d str>> {
    if options.to_latest_revision {
        descriptor.branch()
    } else {
        Ok(None)
    }
}

fn target_commit(
    descriptor: &SubmoduleDescriptor,
    module: &Repository,
    branch: Option<&str>,
) -> anyhow::Result<ObjectId> {
    let Some(branch) = branch else {
        return Ok(*descriptor.commit());
    };

    module
        .refs()
        .read_ref(&format!("{REMOTE_PREFIX}/{branch}"))?
        .with_context(|| {
            format!(
                "submodule '{}' has no remote branch '{branch}'",
                descriptor.path().display()
            )
        })
}

fn ensure_available(module: &Repository, commit: &ObjectId, url: &str) -> anyhow::Result<()> {
    if module.database().exists(commit) {
        Ok(())
    } else {
        anyhow::bail!("commit {commit} is not available from {url}")
    }
}
