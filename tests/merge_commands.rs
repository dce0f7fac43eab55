use assert_fs::TempDir;
use bitmod::areas::repository::Repository;
use bitmod::artifacts::core::error::RepositoryError;
use bitmod::artifacts::diff::DiffEndpoint;
use bitmod::artifacts::index::index_entry::Stage;
use bitmod::artifacts::merge::three_way::{ConflictKind, merge_trees};
use bitmod::artifacts::merge::{ConflictSide, MergeOutcome};
use bitmod::artifacts::objects::object_id::ObjectId;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::Path;

mod common;
use common::repository::{branch, commit_files, open_repository, read_file, repository_dir, switch};

/// History:
///
/// ```text
///       A (base)
///      / \
///     B   C
///     |   |
///   master  topic
/// ```
///
/// `ours` is committed on master, `theirs` on topic; master is checked out
/// afterwards.
fn diverge(
    repository: &Repository,
    base: &[(&str, &str)],
    ours: &[(&str, &str)],
    theirs: &[(&str, &str)],
) -> (ObjectId, ObjectId, ObjectId) {
    let base = commit_files(repository, base, "A - base");
    branch(repository, "topic", base);

    let ours = commit_files(repository, ours, "B - master");

    switch(repository, "topic");
    let theirs = commit_files(repository, theirs, "C - topic");
    switch(repository, "master");

    (base, ours, theirs)
}

fn parents_of(repository: &Repository, commit: &ObjectId) -> Vec<ObjectId> {
    repository
        .database()
        .parse_object_as_commit(commit)
        .unwrap()
        .unwrap()
        .parents()
        .to_vec()
}

#[rstest]
fn merging_a_tree_with_itself_is_clean_and_unchanged(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let commit = commit_files(&repository, &[("a.txt", "a"), ("b/c.txt", "c")], "initial");

    let result = merge_trees(repository.database(), Some(&commit), &commit, &commit).unwrap();

    assert!(result.is_clean());
    let merged = result
        .index
        .resolved_entries()
        .map(|entry| (entry.name.clone(), entry.database_entry()))
        .collect::<Vec<_>>();
    let original = repository
        .database()
        .flatten_tree(&commit)
        .unwrap()
        .into_iter()
        .collect::<Vec<_>>();
    assert_eq!(merged, original);
}

#[rstest]
fn divergent_changes_to_different_files_merge_cleanly(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let (base, ours, theirs) = diverge(
        &repository,
        &[("left.txt", "initial\n"), ("right.txt", "initial\n")],
        &[("left.txt", "master change\n")],
        &[("right.txt", "topic change\n")],
    );

    let outcome = repository.merge("topic", "Merge topic").unwrap();

    let MergeOutcome::Merged { commit, base: found } = outcome else {
        panic!("expected a merge commit, got {outcome:?}");
    };
    assert_eq!(found, Some(base));
    assert_eq!(parents_of(&repository, &commit), vec![ours, theirs]);
    assert_eq!(repository.refs().read_head().unwrap(), Some(commit));
    assert_eq!(read_file(&repository, "left.txt"), "master change\n");
    assert_eq!(read_file(&repository, "right.txt"), "topic change\n");
}

#[rstest]
fn merging_a_descendant_fast_forwards(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let base = commit_files(&repository, &[("a.txt", "a")], "base");
    branch(&repository, "topic", base);
    switch(&repository, "topic");
    let tip = commit_files(&repository, &[("b.txt", "b")], "topic work");
    switch(&repository, "master");

    let outcome = repository.merge("topic", "unused").unwrap();

    assert_eq!(outcome, MergeOutcome::FastForward(tip));
    assert_eq!(repository.refs().read_ref("refs/heads/master").unwrap(), Some(tip));
    assert_eq!(read_file(&repository, "b.txt"), "b");
}

#[rstest]
fn merging_an_ancestor_changes_nothing(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let base = commit_files(&repository, &[("a.txt", "a")], "base");
    let head = commit_files(&repository, &[("a.txt", "b")], "next");

    let outcome = repository.merge(&base.to_hex(), "unused").unwrap();

    assert_eq!(outcome, MergeOutcome::UpToDate);
    assert_eq!(repository.refs().read_head().unwrap(), Some(head));
}

#[rstest]
fn conflicting_edits_are_recorded_as_stages(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let (base, ours, theirs) = diverge(
        &repository,
        &[("f.txt", "base\n"), ("other.txt", "same\n")],
        &[("f.txt", "ours\n")],
        &[("f.txt", "theirs\n"), ("new.txt", "clean\n")],
    );

    let outcome = repository.merge("topic", "Merge topic").unwrap();

    let MergeOutcome::Conflicted { conflicts, .. } = outcome else {
        panic!("expected conflicts, got {outcome:?}");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].path, Path::new("f.txt"));
    assert_eq!(conflicts[0].kind, ConflictKind::Content);

    let index = repository.load_index().unwrap();
    let blob_at = |commit: &ObjectId| repository.database().flatten_tree(commit).unwrap()[Path::new("f.txt")].oid;
    for (stage, commit) in [(Stage::Base, base), (Stage::Ours, ours), (Stage::Theirs, theirs)] {
        assert_eq!(index.entry_at(Path::new("f.txt"), stage).unwrap().oid, blob_at(&commit));
    }
    assert!(index.entry_at(Path::new("f.txt"), Stage::Resolved).is_none());
    assert_eq!(read_file(&repository, "f.txt"), "ours\n");
    assert_eq!(read_file(&repository, "new.txt"), "clean\n");
    assert_eq!(repository.refs().read_head().unwrap(), Some(ours));
}

#[rstest]
fn committing_with_unresolved_conflicts_fails(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    diverge(
        &repository,
        &[("f.txt", "base\n")],
        &[("f.txt", "ours\n")],
        &[("f.txt", "theirs\n")],
    );
    repository.merge("topic", "Merge topic").unwrap();

    let error = repository.commit("too early", None).unwrap_err();

    assert!(matches!(
        RepositoryError::find(&error),
        Some(RepositoryError::DirtyMergeState(1))
    ));
}

#[rstest]
fn resolving_then_committing_concludes_the_merge(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    let (_, ours, theirs) = diverge(
        &repository,
        &[("f.txt", "base\n")],
        &[("f.txt", "ours\n")],
        &[("f.txt", "theirs\n")],
    );
    repository.merge("topic", "Merge topic").unwrap();

    repository.resolve(Path::new("f.txt"), ConflictSide::Theirs).unwrap();
    let index_tree = repository.write_tree().unwrap();
    let commit = repository.commit("Merge topic", None).unwrap();

    assert_eq!(read_file(&repository, "f.txt"), "theirs\n");
    assert_eq!(parents_of(&repository, &commit), vec![ours, theirs]);
    assert!(
        repository
            .diff(Some(DiffEndpoint::Tree(commit)), Some(DiffEndpoint::Tree(index_tree)))
            .unwrap()
            .is_empty()
    );
    assert!(!repository.merge_head_path().exists());
}

#[rstest]
fn a_deletion_against_an_edit_keeps_only_the_present_stages(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    diverge(
        &repository,
        &[("f.txt", "base\n"), ("keep.txt", "k\n")],
        &[("f.txt", "edited\n")],
        &[],
    );
    switch(&repository, "topic");
    repository.remove(&[Path::new("f.txt").to_path_buf()], true).unwrap();
    repository.commit("delete f", None).unwrap();
    switch(&repository, "master");

    let outcome = repository.merge("topic", "Merge topic").unwrap();

    let MergeOutcome::Conflicted { conflicts, .. } = outcome else {
        panic!("expected conflicts, got {outcome:?}");
    };
    assert_eq!(conflicts[0].kind, ConflictKind::ModifyDelete);
    let index = repository.load_index().unwrap();
    assert!(index.entry_at(Path::new("f.txt"), Stage::Base).is_some());
    assert!(index.entry_at(Path::new("f.txt"), Stage::Ours).is_some());
    assert!(index.entry_at(Path::new("f.txt"), Stage::Theirs).is_none());

    repository.resolve(Path::new("f.txt"), ConflictSide::Theirs).unwrap();
    assert!(!repository.path().join("f.txt").exists());
    assert!(repository.load_index().unwrap().entries_at_path(Path::new("f.txt")).is_empty());
}

#[rstest]
fn a_second_merge_is_refused_until_the_first_is_committed(repository_dir: TempDir) {
    let repository = open_repository(repository_dir.path());
    diverge(
        &repository,
        &[("f.txt", "base\n")],
        &[("f.txt", "ours\n")],
        &[("f.txt", "theirs\n")],
    );
    repository.merge("topic", "Merge topic").unwrap();

    assert!(repository.merge("topic", "again").is_err());
}
