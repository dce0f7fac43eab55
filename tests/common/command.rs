use assert_cmd::Command;
use std::path::Path;

pub fn run_bitmod_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("bitmod").expect("Failed to find bitmod binary");
    cmd.env_remove("BITMOD_LOG");
    cmd.current_dir(dir);
    for arg in args {
        cmd.arg(arg);
    }
    cmd
}

pub fn bitmod_commit(dir: &Path, message: &str) -> Command {
    let mut cmd = run_bitmod_command(dir, &["commit", "-m", message]);
    cmd.envs(vec![
        ("GIT_AUTHOR_NAME", "fake_user"),
        ("GIT_AUTHOR_EMAIL", "fake_email@email.com"),
        ("GIT_AUTHOR_DATE", "2023-01-01 12:00:00 +0000"), // %Y-%m-%d %H:%M:%S %z
    ]);
    cmd
}

pub fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("Failed to run bitmod");
    assert!(
        output.status.success(),
        "bitmod failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("stdout is not UTF-8")
}
