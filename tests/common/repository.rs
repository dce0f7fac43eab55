use crate::common::file::write_files;
use assert_fs::TempDir;
use bitmod::areas::repository::Repository;
use bitmod::artifacts::core::settings::Settings;
use bitmod::artifacts::objects::commit::Author;
use bitmod::artifacts::objects::object_id::ObjectId;
use chrono::{FixedOffset, TimeZone};
use rstest::fixture;
use std::path::{Path, PathBuf};

pub fn author() -> Author {
    let timestamp = FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2023, 1, 1, 12, 0, 0)
        .unwrap();
    Author::new_with_timestamp("fake_user".into(), "fake_email@email.com".into(), timestamp)
}

pub fn settings() -> Settings {
    Settings::default().with_author(author())
}

/// Open (creating if needed) and initialize a repository that prints nothing
pub fn open_repository(path: &Path) -> Repository {
    let repository =
        Repository::open(path, settings(), Box::new(std::io::sink())).expect("Failed to open repository");
    repository.init().expect("Failed to init repository");
    repository
}

#[fixture]
pub fn repository_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// Write `files`, stage everything and commit
pub fn commit_files(repository: &Repository, files: &[(&str, &str)], message: &str) -> ObjectId {
    write_files(repository.path(), files);
    repository
        .add(&[PathBuf::from(".")])
        .expect("Failed to stage files");
    repository.commit(message, None).expect("Failed to commit")
}

pub fn read_file(repository: &Repository, path: &str) -> String {
    std::fs::read_to_string(repository.path().join(path))
        .unwrap_or_else(|e| panic!("Failed to read {path}: {e}"))
}

pub fn branch(repository: &Repository, name: &str, at: ObjectId) {
    repository
        .refs()
        .update_ref(&format!("refs/heads/{name}"), at)
        .expect("Failed to create branch");
}

pub fn switch(repository: &Repository, name: &str) {
    let target = repository
        .refs()
        .resolve_name(name, repository.database())
        .expect("Failed to resolve branch");
    repository
        .checkout(&target, Some(name), false)
        .expect("Failed to switch branch");
}
