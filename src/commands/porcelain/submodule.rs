use crate::areas::repository::Repository;
use crate::artifacts::submodule::fetcher::LocalFetcher;
use crate::artifacts::submodule::root_module::{RootModule, UpdateOptions, UpdateOutcome, UpdateReport};

impl Repository {
    /// Bring every submodule checkout in line with HEAD, fetching from local repositories
    pub fn submodule_update(&self, options: &UpdateOptions) -> anyhow::Result<UpdateReport> {
        let report = RootModule::new(self, &LocalFetcher).update(options)?;

        for module in report.outcomes() {
            if matches!(module.outcome, UpdateOutcome::UpToDate) {
                continue;
            }
            writeln!(self.writer(), "{}: {}", module.path.display(), module.outcome)?;
        }

        tracing::info!(
            submodules = report.outcomes().len(),
            mutations = report.mutations(),
            failures = report.failures().count(),
            "submodule update finished"
        );
        Ok(report)
    }
}
