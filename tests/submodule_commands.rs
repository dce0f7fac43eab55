use assert_fs::TempDir;
use bitmod::areas::repository::Repository;
use bitmod::artifacts::core::error::RepositoryError;
use bitmod::artifacts::objects::object_id::ObjectId;
use bitmod::artifacts::submodule::fetcher::{LocalFetcher, ModuleFetcher};
use bitmod::artifacts::submodule::graph::SubmoduleGraph;
use bitmod::artifacts::submodule::root_module::{PlannedAction, UpdateOptions, UpdateOutcome};
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

mod common;
use common::file::write_files;
use common::repository::{commit_files, open_repository, read_file};

const LIB_PATH: &str = "vendor/lib";

/// An upstream `lib` repository and an `app` repository recording it at `vendor/lib`
struct Superproject {
    _dir: TempDir,
    upstream: Repository,
    app: Repository,
    lib_v1: ObjectId,
    app_v1: ObjectId,
}

impl Superproject {
    fn url(&self) -> String {
        self.upstream.path().display().to_string()
    }

    fn module(&self) -> Repository {
        self.app.nested(Path::new(LIB_PATH)).unwrap()
    }

    fn module_path(&self) -> PathBuf {
        self.app.path().join(LIB_PATH)
    }

    /// Stage only `.gitmodules` with `text` and commit
    fn commit_gitmodules(&self, text: &str, message: &str) -> ObjectId {
        write_files(self.app.path(), &[(".gitmodules", text)]);
        self.app.add(&[PathBuf::from(".gitmodules")]).unwrap();
        self.app.commit(message, None).unwrap()
    }

    /// Record `commit` of the nested checkout in a new app commit
    fn bump(&self, commit: &ObjectId, message: &str) -> ObjectId {
        let module = self.module();
        LocalFetcher.fetch(&self.url(), &self.module_path()).unwrap();
        module.checkout(commit, None, false).unwrap();
        self.app.add(&[PathBuf::from(LIB_PATH)]).unwrap();
        self.app.commit(message, None).unwrap()
    }

    fn forget_checkout(&self) {
        std::fs::remove_dir_all(self.module_path()).unwrap();
    }
}

fn gitmodules(url: &str, extra: &str) -> String {
    format!("[submodule \"lib\"]\n\tpath = {LIB_PATH}\n\turl = {url}\n{extra}")
}

#[fixture]
fn superproject() -> Superproject {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let upstream = open_repository(&dir.path().join("lib"));
    let lib_v1 = commit_files(&upstream, &[("lib.txt", "v1\n")], "lib v1");

    let app = open_repository(&dir.path().join("app"));
    let url = upstream.path().display().to_string();
    LocalFetcher.fetch(&url, &app.path().join(LIB_PATH)).unwrap();
    app.nested(Path::new(LIB_PATH))
        .unwrap()
        .checkout(&lib_v1, None, false)
        .unwrap();
    let app_v1 = commit_files(
        &app,
        &[(".gitmodules", &gitmodules(&url, "")), ("app.txt", "app\n")],
        "add lib",
    );

    Superproject {
        _dir: dir,
        upstream,
        app,
        lib_v1,
        app_v1,
    }
}

fn is_failure_of(outcome: Option<&UpdateOutcome>, expected: fn(&RepositoryError) -> bool) -> bool {
    match outcome {
        Some(UpdateOutcome::Failed(error)) => RepositoryError::find(error).is_some_and(expected),
        _ => false,
    }
}

#[rstest]
fn the_graph_binds_every_configured_gitlink(superproject: Superproject) {
    let graph = SubmoduleGraph::at_commit(&superproject.app, &superproject.app_v1).unwrap();

    assert_eq!(graph.descriptors().len(), 1);
    let descriptor = graph.get(Path::new(LIB_PATH)).unwrap();
    assert_eq!(descriptor.commit(), &superproject.lib_v1);
    assert_eq!(descriptor.name().unwrap(), "lib");
    assert_eq!(descriptor.url().unwrap(), superproject.url());
    assert_eq!(descriptor.parent_commit(), Some(&superproject.app_v1));
    assert!(descriptor.is_checked_out().unwrap());
    assert!(graph.stale_sections().is_empty());
    assert!(graph.unconfigured().is_empty());
}

#[rstest]
fn missing_checkouts_are_cloned_once(superproject: Superproject) {
    superproject.forget_checkout();

    let first = superproject.app.submodule_update(&UpdateOptions::default()).unwrap();
    let second = superproject.app.submodule_update(&UpdateOptions::default()).unwrap();

    assert!(matches!(
        first.outcome(Path::new(LIB_PATH)),
        Some(UpdateOutcome::Applied(PlannedAction::Clone { commit, .. })) if *commit == superproject.lib_v1
    ));
    assert_eq!(first.mutations(), 1);
    assert_eq!(read_file(&superproject.app, "vendor/lib/lib.txt"), "v1\n");
    assert_eq!(superproject.module().refs().read_head().unwrap(), Some(superproject.lib_v1));

    assert_eq!(second.mutations(), 0);
    assert!(matches!(second.outcome(Path::new(LIB_PATH)), Some(UpdateOutcome::UpToDate)));
}

#[rstest]
fn dry_runs_only_plan(superproject: Superproject) {
    superproject.forget_checkout();
    let options = UpdateOptions {
        dry_run: true,
        ..Default::default()
    };

    let report = superproject.app.submodule_update(&options).unwrap();

    assert!(matches!(
        report.outcome(Path::new(LIB_PATH)),
        Some(UpdateOutcome::Planned(PlannedAction::Clone { .. }))
    ));
    assert_eq!(report.mutations(), 0);
    assert!(!superproject.module_path().exists());
}

#[rstest]
fn outdated_checkouts_move_to_the_recorded_commit(superproject: Superproject) {
    let lib_v2 = commit_files(&superproject.upstream, &[("lib.txt", "v2\n")], "lib v2");
    superproject.bump(&lib_v2, "bump lib");
    superproject
        .module()
        .checkout(&superproject.lib_v1, None, false)
        .unwrap();

    let report = superproject.app.submodule_update(&UpdateOptions::default()).unwrap();

    assert!(matches!(
        report.outcome(Path::new(LIB_PATH)),
        Some(UpdateOutcome::Applied(PlannedAction::Checkout { from, to }))
            if *from == Some(superproject.lib_v1) && *to == lib_v2
    ));
    assert_eq!(read_file(&superproject.app, "vendor/lib/lib.txt"), "v2\n");
    assert_eq!(
        superproject.app.submodule_update(&UpdateOptions::default()).unwrap().mutations(),
        0
    );
}

#[rstest]
fn dropped_submodules_are_deleted(superproject: Superproject) {
    superproject.app.remove(&[PathBuf::from(LIB_PATH)], false).unwrap();
    superproject.commit_gitmodules("", "drop lib");

    let report = superproject.app.submodule_update(&UpdateOptions::default()).unwrap();

    assert!(matches!(
        report.outcome(Path::new(LIB_PATH)),
        Some(UpdateOutcome::Applied(PlannedAction::Remove))
    ));
    assert!(!superproject.module_path().exists());
}

#[rstest]
fn dirty_checkouts_are_only_deleted_when_forced(superproject: Superproject) {
    superproject.app.remove(&[PathBuf::from(LIB_PATH)], false).unwrap();
    superproject.commit_gitmodules("", "drop lib");
    write_files(&superproject.module_path(), &[("scratch.txt", "local work")]);

    let refused = superproject.app.submodule_update(&UpdateOptions::default()).unwrap();
    assert!(is_failure_of(refused.outcome(Path::new(LIB_PATH)), |error| {
        matches!(error, RepositoryError::DirtyNestedRepository(_))
    }));
    assert_eq!(refused.failures().count(), 1);
    assert!(superproject.module_path().join("scratch.txt").exists());

    let forced = superproject
        .app
        .submodule_update(&UpdateOptions {
            force: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(forced.mutations(), 1);
    assert!(!superproject.module_path().exists());
}

#[rstest]
fn stale_configuration_is_reported_and_left_in_place(superproject: Superproject) {
    let url = superproject.url();
    let stale = format!("[submodule \"old\"]\n\tpath = old\n\turl = {url}\n");
    superproject.commit_gitmodules(&gitmodules(&url, &stale), "configure old");
    LocalFetcher.fetch(&url, &superproject.app.path().join("old")).unwrap();

    for _ in 0..2 {
        let report = superproject.app.submodule_update(&UpdateOptions::default()).unwrap();

        assert!(is_failure_of(report.outcome(Path::new("old")), |error| {
            matches!(error, RepositoryError::InconsistentSubmoduleConfig { path, .. } if path == Path::new("old"))
        }));
        assert!(matches!(report.outcome(Path::new(LIB_PATH)), Some(UpdateOutcome::UpToDate)));
        assert!(superproject.app.path().join("old").join(".git").exists());
    }
}

#[rstest]
fn gitlinks_without_configuration_fail_alone(superproject: Superproject) {
    superproject.commit_gitmodules("", "forget configuration");

    let report = superproject.app.submodule_update(&UpdateOptions::default()).unwrap();

    assert!(is_failure_of(report.outcome(Path::new(LIB_PATH)), |error| {
        matches!(error, RepositoryError::InconsistentSubmoduleConfig { .. })
    }));
    assert!(superproject.module_path().exists());
}

#[rstest]
fn cancelled_updates_touch_nothing(superproject: Superproject) {
    superproject.forget_checkout();
    let options = UpdateOptions {
        cancel: Some(Arc::new(AtomicBool::new(true))),
        ..Default::default()
    };

    let report = superproject.app.submodule_update(&options).unwrap();

    assert!(matches!(report.outcome(Path::new(LIB_PATH)), Some(UpdateOutcome::Cancelled)));
    assert!(!superproject.module_path().exists());
}

#[rstest]
fn latest_revision_follows_the_configured_branch(superproject: Superproject) {
    superproject.commit_gitmodules(
        &gitmodules(&superproject.url(), "\tbranch = master\n"),
        "track master",
    );
    let lib_v2 = commit_files(&superproject.upstream, &[("lib.txt", "v2\n")], "lib v2");
    superproject.forget_checkout();
    let options = UpdateOptions {
        to_latest_revision: true,
        ..Default::default()
    };

    let first = superproject.app.submodule_update(&options).unwrap();
    let second = superproject.app.submodule_update(&options).unwrap();

    assert!(matches!(
        first.outcome(Path::new(LIB_PATH)),
        Some(UpdateOutcome::Applied(PlannedAction::Clone { commit, .. })) if *commit == lib_v2
    ));
    let module = superproject.module();
    assert_eq!(module.refs().current_ref().unwrap(), "refs/heads/master");
    assert_eq!(module.refs().read_head().unwrap(), Some(lib_v2));
    assert_eq!(second.mutations(), 0);
}

#[rstest]
fn recursive_updates_descend_into_nested_submodules(superproject: Superproject) {
    let root = superproject.upstream.path().parent().unwrap().to_path_buf();
    let core = open_repository(&root.join("core"));
    let core_v1 = commit_files(&core, &[("core.txt", "core\n")], "core v1");
    let core_url = core.path().display().to_string();

    LocalFetcher.fetch(&core_url, &superproject.upstream.path().join("vendor/core")).unwrap();
    superproject
        .upstream
        .nested(Path::new("vendor/core"))
        .unwrap()
        .checkout(&core_v1, None, false)
        .unwrap();
    let core_config = format!("[submodule \"core\"]\n\tpath = vendor/core\n\turl = {core_url}\n");
    let lib_v2 = commit_files(&superproject.upstream, &[(".gitmodules", &core_config)], "lib uses core");
    superproject.bump(&lib_v2, "bump lib");
    superproject.forget_checkout();

    let report = superproject
        .app
        .submodule_update(&UpdateOptions {
            recursive: true,
            ..Default::default()
        })
        .unwrap();

    assert_eq!(
        report
            .outcomes()
            .iter()
            .map(|module| module.path.clone())
            .collect::<Vec<_>>(),
        vec![PathBuf::from(LIB_PATH), PathBuf::from("vendor/lib/vendor/core")]
    );
    assert_eq!(report.mutations(), 2);
    assert_eq!(read_file(&superproject.app, "vendor/lib/vendor/core/core.txt"), "core\n");
}
