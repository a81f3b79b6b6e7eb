use anyhow::Result;
use git2::Repository;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_refguard");
const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

const ALICE: &str = include_str!("fixtures/alice.pub");
const COMMIT_ALICE: &[u8] = include_bytes!("fixtures/commit_signed_alice.txt");
const COMMIT_MALLORY: &[u8] = include_bytes!("fixtures/commit_signed_mallory.txt");
const TAG_CHAINED: &[u8] = include_bytes!("fixtures/tag_chained_mallory_alice.txt");

/// Run the binary with `stdin` piped in and an empty HOME so no global
/// config leaks into the test.
fn run(home: &Path, args: &[&str], stdin: &[u8]) -> Result<Output> {
    let mut child = Command::new(BIN)
        .args(args)
        .env("HOME", home)
        .env_remove("GIT_DIR")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut input) = child.stdin.take() {
        input.write_all(stdin)?;
    }
    Ok(child.wait_with_output()?)
}

fn fixture(name: &str) -> String {
    format!("{FIXTURES}/{name}")
}

/// Bare repo with alice authorized for everything under refs/.
fn setup_repo(dir: &Path) -> Result<Repository> {
    let repo = Repository::init_bare(dir)?;
    {
        let blob = repo.blob(ALICE.as_bytes())?;
        let mut ssh = repo.treebuilder(None)?;
        ssh.insert("authorized_keys", blob, 0o100644)?;
        let ssh = ssh.write()?;
        let mut root = repo.treebuilder(None)?;
        root.insert(".ssh", ssh, 0o040000)?;
        let tree = repo.find_tree(root.write()?)?;
        let sig = git2::Signature::new("Admin", "admin@example.com", &git2::Time::new(0, 0))?;
        repo.commit(Some("refs/@meta"), &sig, &sig, "keys", &tree, &[])?;
    }
    Ok(repo)
}

#[test]
fn test_pre_receive_exit_codes() -> Result<()> {
    let home = TempDir::new()?;
    let git_dir = TempDir::new()?;
    let repo = setup_repo(git_dir.path())?;
    let odb = repo.odb()?;
    let good = odb.write(git2::ObjectType::Commit, COMMIT_ALICE)?;
    let bad = odb.write(git2::ObjectType::Commit, COMMIT_MALLORY)?;
    let zero = "0".repeat(40);
    let dir = git_dir.path().to_str().unwrap();
    let args = ["pre-receive", "--git-dir", dir];

    let accepted = format!("{zero} {good} refs/heads/main\n");
    let out = run(home.path(), &args, accepted.as_bytes())?;
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));

    let rejected = format!("{zero} {good} refs/heads/main\n{zero} {bad} refs/heads/evil\n");
    let out = run(home.path(), &args, rejected.as_bytes())?;
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("refs/heads/evil"), "{stderr}");

    let outside = format!("{zero} {good} HEAD\n");
    let out = run(home.path(), &args, outside.as_bytes())?;
    assert_eq!(out.status.code(), Some(1));

    let malformed = format!("{zero} {good}\n");
    let out = run(home.path(), &args, malformed.as_bytes())?;
    assert_eq!(out.status.code(), Some(2));

    Ok(())
}

#[test]
fn test_pre_receive_cli_backend_matches_libgit2() -> Result<()> {
    let home = TempDir::new()?;
    let git_dir = TempDir::new()?;
    let repo = setup_repo(git_dir.path())?;
    let odb = repo.odb()?;
    let good = odb.write(git2::ObjectType::Commit, COMMIT_ALICE)?;
    let bad = odb.write(git2::ObjectType::Commit, COMMIT_MALLORY)?;
    let zero = "0".repeat(40);
    let dir = git_dir.path().to_str().unwrap();
    let args = ["pre-receive", "--git-dir", dir];

    let accepted = format!("{zero} {good} refs/heads/main\n");
    let rejected = format!("{zero} {good} refs/heads/main\n{zero} {bad} refs/heads/evil\n");
    for backend in ["libgit2", "cli"] {
        std::fs::write(
            git_dir.path().join("refguard.toml"),
            format!("backend = \"{backend}\"\n"),
        )?;

        let out = run(home.path(), &args, accepted.as_bytes())?;
        assert_eq!(
            out.status.code(),
            Some(0),
            "{backend}: {}",
            String::from_utf8_lossy(&out.stderr)
        );

        let out = run(home.path(), &args, rejected.as_bytes())?;
        assert_eq!(out.status.code(), Some(1), "{backend}");
    }
    Ok(())
}

#[test]
fn test_metadata_ref_is_not_looked_up_by_short_name() -> Result<()> {
    let home = TempDir::new()?;
    let git_dir = TempDir::new()?;
    let repo = Repository::init_bare(git_dir.path())?;
    let good = repo.odb()?.write(git2::ObjectType::Commit, COMMIT_ALICE)?;
    {
        // a branch anyone may push, named so that git would expand
        // `refs/teams/@meta` to it
        let blob = repo.blob(ALICE.as_bytes())?;
        let mut ssh = repo.treebuilder(None)?;
        ssh.insert("authorized_keys", blob, 0o100644)?;
        let ssh = ssh.write()?;
        let mut root = repo.treebuilder(None)?;
        root.insert(".ssh", ssh, 0o040000)?;
        let tree = repo.find_tree(root.write()?)?;
        let sig = git2::Signature::new("Eve", "eve@example.com", &git2::Time::new(0, 0))?;
        repo.commit(Some("refs/heads/refs/teams/@meta"), &sig, &sig, "keys", &tree, &[])?;
    }
    let zero = "0".repeat(40);
    let push = format!("{zero} {good} refs/teams/x/main\n");
    let dir = git_dir.path().to_str().unwrap();

    for backend in ["libgit2", "cli"] {
        std::fs::write(
            git_dir.path().join("refguard.toml"),
            format!("backend = \"{backend}\"\n"),
        )?;
        let out = run(home.path(), &["pre-receive", "--git-dir", dir], push.as_bytes())?;
        assert_eq!(out.status.code(), Some(1), "{backend} accepted a foreign grant");
    }
    Ok(())
}

#[test]
fn test_pre_receive_bad_config_fails_closed() -> Result<()> {
    let home = TempDir::new()?;
    let git_dir = TempDir::new()?;
    setup_repo(git_dir.path())?;
    std::fs::write(git_dir.path().join("refguard.toml"), "trust = \"everyone\"\n")?;

    let out = run(
        home.path(),
        &["pre-receive", "--git-dir", git_dir.path().to_str().unwrap()],
        b"",
    )?;
    assert_eq!(out.status.code(), Some(2));
    Ok(())
}

#[test]
fn test_check_commit() -> Result<()> {
    let home = TempDir::new()?;
    let alice = fixture("alice.pub");
    let bob = fixture("bob.pub");

    let out = run(home.path(), &["check-commit", "--authorized-keys", &alice], COMMIT_ALICE)?;
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Good signature"));

    let out = run(home.path(), &["check-commit", "--authorized-keys", &bob], COMMIT_ALICE)?;
    assert_eq!(out.status.code(), Some(1));

    // no keys file: any correctly signed commit passes
    let out = run(home.path(), &["check-commit"], COMMIT_MALLORY)?;
    assert_eq!(out.status.code(), Some(0));

    let out = run(home.path(), &["check-commit", "--namespace", "file"], COMMIT_ALICE)?;
    assert_eq!(out.status.code(), Some(1));
    Ok(())
}

#[test]
fn test_check_tag_and_inspect() -> Result<()> {
    let home = TempDir::new()?;
    let alice = fixture("alice.pub");

    let out = run(home.path(), &["check-tag", "--authorized-keys", &alice], TAG_CHAINED)?;
    assert_eq!(out.status.code(), Some(0));

    let out = run(home.path(), &["inspect"], TAG_CHAINED)?;
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("signature 2:"), "{stdout}");
    assert!(stdout.contains("SHA256:hoezKEqhWeu+owLRfD5l/e6AdZPff8uavLsgdN+XQhI"));
    assert!(stdout.contains("SHA256:bv7RFqIOEvDmbSHcNU1l3nK82mWlwlmQy9qjVVBez4w"));
    Ok(())
}

#[test]
fn test_keys_lists_resolved_set() -> Result<()> {
    let home = TempDir::new()?;
    let git_dir = TempDir::new()?;
    setup_repo(git_dir.path())?;

    let out = run(
        home.path(),
        &[
            "keys",
            "refs/heads/main",
            "--git-dir",
            git_dir.path().to_str().unwrap(),
        ],
        b"",
    )?;
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("SHA256:hoezKEqhWeu+owLRfD5l/e6AdZPff8uavLsgdN+XQhI"));
    Ok(())
}
