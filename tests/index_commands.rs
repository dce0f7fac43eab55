use assert_fs::TempDir;
use bitmod::areas::repository::Repository;
use bitmod::artifacts::core::error::RepositoryError;
use bitmod::artifacts::diff::{ChangeType, DiffEndpoint};
use bitmod::artifacts::index::index_entry::Stage;
use bitmod::artifacts::merge::MergeOutcome;
use bitmod::artifacts::objects::object_id::ObjectId;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::{Path, PathBuf};

mod common;
use common::file::{write_files, write_generated_files};
use common::repository::{branch, commit_files, open_repository, repository_dir, switch};

#[rstest]
fn added_files_are_staged_with_their_blob_ids(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    write_files(repository.path(), &[("a/b/c.txt", "test content\n")]);

    repository.add(&[PathBuf::from("a")]).unwrap();

    let index = repository.load_index().unwrap();
    let entry = index.entry_at(Path::new("a/b/c.txt"), Stage::Resolved).unwrap();
    assert_eq!(entry.oid.to_hex(), "d670460b4b4aece5915caf5c68d12f560a9fe3e4");
    assert_eq!(index.len(), 1);
}

#[rstest]
fn adding_a_missing_untracked_path_fails_without_touching_the_index(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    write_files(repository.path(), &[("kept.txt", "kept")]);

    let error = repository
        .add(&[PathBuf::from("kept.txt"), PathBuf::from("missing.txt")])
        .unwrap_err();

    assert!(matches!(
        RepositoryError::find(&error),
        Some(RepositoryError::PathNotFound(path)) if path == Path::new("missing.txt")
    ));
    assert!(repository.load_index().unwrap().is_empty());
}

#[rstest]
fn adding_a_deleted_tracked_path_unstages_it(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    commit_files(&repository, &[("f.txt", "x"), ("g.txt", "y")], "initial");

    std::fs::remove_file(repository.path().join("f.txt")).unwrap();
    repository.add(&[PathBuf::from("f.txt")]).unwrap();

    let index = repository.load_index().unwrap();
    assert!(index.entry_by_path(Path::new("f.txt")).is_none());
    assert!(index.entry_by_path(Path::new("g.txt")).is_some());
}

#[rstest]
fn many_files_are_staged_in_one_call(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let files = write_generated_files(&repository.path().join("generated"), 12);

    repository.add(&[PathBuf::from(".")]).unwrap();

    assert_eq!(repository.load_index().unwrap().len(), files.len());
}

#[rstest]
fn a_second_writer_is_refused_while_a_session_is_open(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    write_files(repository.path(), &[("f.txt", "x")]);

    let session = repository.index_session().unwrap();
    assert!(repository.add(&[PathBuf::from("f.txt")]).is_err());
    drop(session);

    repository.add(&[PathBuf::from("f.txt")]).unwrap();
}

#[rstest]
fn removing_drops_the_path_from_index_and_disk(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    commit_files(&repository, &[("dir/f.txt", "x"), ("g.txt", "y")], "initial");

    repository.remove(&[PathBuf::from("dir")], true).unwrap();
    repository.remove(&[PathBuf::from("g.txt")], false).unwrap();

    let index = repository.load_index().unwrap();
    assert!(index.is_empty());
    assert!(!repository.path().join("dir").exists());
    assert!(repository.path().join("g.txt").exists());
}

#[rstest]
fn removing_an_untracked_path_fails(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());

    let error = repository.remove(&[PathBuf::from("nope")], false).unwrap_err();

    assert!(matches!(
        RepositoryError::find(&error),
        Some(RepositoryError::PathNotFound(_))
    ));
}

#[rstest]
fn diff_against_the_working_directory_reports_edits_and_untracked_files(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let a = commit_files(&repository, &[("f", "x\n")], "first");
    write_files(repository.path(), &[("f", "y\n"), ("g", "new\n")]);

    let records = repository.diff(Some(DiffEndpoint::Tree(a)), None).unwrap();

    let summary = records
        .iter()
        .map(|record| (record.path.clone(), record.change_type))
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![
            (PathBuf::from("f"), ChangeType::Modified),
            (PathBuf::from("g"), ChangeType::Added),
        ]
    );
}

#[rstest]
fn diff_between_commits_reports_modified_and_added_paths(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let first = commit_files(&repository, &[("f", "x\n")], "first");
    let second = commit_files(&repository, &[("f", "y\n"), ("g", "new\n")], "second");

    let records = repository
        .diff(Some(DiffEndpoint::Tree(first)), Some(DiffEndpoint::Tree(second)))
        .unwrap();

    let summary = records
        .iter()
        .map(|record| (record.path.clone(), record.change_type))
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![
            (PathBuf::from("f"), ChangeType::Modified),
            (PathBuf::from("g"), ChangeType::Added),
        ]
    );
}

fn assert_self_diffs_are_empty(repository: &Repository, head: ObjectId) {
    for endpoint in [
        Some(DiffEndpoint::Tree(head)),
        Some(DiffEndpoint::Index),
        Some(DiffEndpoint::WorkingDirectory),
        None,
    ] {
        assert!(repository.diff(endpoint, endpoint).unwrap().is_empty());
    }
    assert!(repository.diff(Some(DiffEndpoint::WorkingDirectory), None).unwrap().is_empty());
}

#[rstest]
fn diff_of_an_endpoint_with_itself_is_empty(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let head = commit_files(&repository, &[("a.txt", "a"), ("b/c.txt", "c")], "initial");
    write_files(repository.path(), &[("a.txt", "edited"), ("untracked.txt", "u")]);

    assert_self_diffs_are_empty(&repository, head);
}

#[rstest]
fn diff_of_a_conflicted_index_with_itself_is_empty(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let base = commit_files(&repository, &[("f.txt", "base\n")], "base");
    branch(&repository, "topic", base);
    let head = commit_files(&repository, &[("f.txt", "ours\n")], "ours");
    switch(&repository, "topic");
    commit_files(&repository, &[("f.txt", "theirs\n")], "theirs");
    switch(&repository, "master");

    let outcome = repository.merge("topic", "Merge topic").unwrap();
    assert!(matches!(outcome, MergeOutcome::Conflicted { .. }));
    let index = repository.load_index().unwrap();
    for stage in Stage::CONFLICT_STAGES {
        assert!(index.entry_at(Path::new("f.txt"), stage).is_some());
    }

    assert_self_diffs_are_empty(&repository, head);
}

#[rstest]
fn staged_and_unstaged_changes_are_told_apart(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let head = commit_files(&repository, &[("staged.txt", "1"), ("unstaged.txt", "2")], "initial");

    write_files(repository.path(), &[("staged.txt", "one")]);
    repository.add(&[PathBuf::from("staged.txt")]).unwrap();
    write_files(repository.path(), &[("unstaged.txt", "two")]);

    let cached = repository
        .diff(Some(DiffEndpoint::Tree(head)), Some(DiffEndpoint::Index))
        .unwrap();
    let worktree = repository.diff(Some(DiffEndpoint::Index), None).unwrap();

    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].path, PathBuf::from("staged.txt"));
    assert_eq!(worktree.len(), 1);
    assert_eq!(worktree[0].path, PathBuf::from("unstaged.txt"));
    assert_eq!(worktree[0].change_type, ChangeType::Modified);
}

#[rstest]
fn moved_files_are_reported_as_renames(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let content = "line one\nline two\nline three\nline four\n";
    let first = commit_files(&repository, &[("old/name.txt", content)], "first");

    std::fs::remove_dir_all(repository.path().join("old")).unwrap();
    write_files(repository.path(), &[("new/name.txt", content)]);
    repository.add(&[PathBuf::from(".")]).unwrap();
    let second = repository.commit("move", None).unwrap();

    let records = repository
        .diff(Some(DiffEndpoint::Tree(first)), Some(DiffEndpoint::Tree(second)))
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].change_type, ChangeType::Renamed);
    assert_eq!(records[0].similarity, Some(100));
    assert_eq!(records[0].name_status(), "R100\told/name.txt\tnew/name.txt");
}

#[rstest]
fn write_tree_matches_the_committed_tree(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let head = commit_files(&repository, &[("a.txt", "a"), ("b/c.txt", "c")], "initial");

    let tree = repository.write_tree().unwrap();

    assert_eq!(repository.database().peel_to_tree(&head).unwrap(), tree);
}

#[rstest]
fn checkout_moves_the_working_tree_between_commits(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let first = commit_files(&repository, &[("a.txt", "first")], "first");
    commit_files(&repository, &[("a.txt", "second"), ("b.txt", "b")], "second");

    repository.checkout(&first, None, false).unwrap();

    assert_eq!(std::fs::read_to_string(repository.path().join("a.txt")).unwrap(), "first");
    assert!(!repository.path().join("b.txt").exists());
    assert_eq!(repository.refs().read_head().unwrap(), Some(first));
    assert!(repository.diff(Some(DiffEndpoint::Index), None).unwrap().is_empty());
}
