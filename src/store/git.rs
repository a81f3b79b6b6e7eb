use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::{ObjectStore, StoreError};
use crate::object::{ObjectId, ObjectType};

/// Object access by shelling out to the `git` executable. Without an
/// explicit git dir, git finds the repository (and the push quarantine)
/// through the environment the hook was started with.
#[derive(Debug, Clone, Default)]
pub struct GitCliStore {
    git_dir: Option<PathBuf>,
}

impl GitCliStore {
    pub fn new(git_dir: Option<PathBuf>) -> Self {
        Self { git_dir }
    }

    fn git(
        &self,
        subcommand: &str,
        args: &[&str],
        input: Option<&[u8]>,
    ) -> Result<Vec<u8>, StoreError> {
        let mut cmd = Command::new("git");
        if let Some(dir) = &self.git_dir {
            cmd.arg("--git-dir").arg(dir);
        }
        cmd.arg(subcommand)
            .args(args)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        // a git that dies early closes its stdin; its exit status says why
        let written = match (input, child.stdin.take()) {
            (Some(data), Some(mut stdin)) => stdin.write_all(data),
            _ => Ok(()),
        };
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(StoreError::Command {
                command: format!("git {subcommand} {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written?;
        Ok(output.stdout)
    }

    /// Type of whatever `rev` names, or `None` when it names nothing.
    /// `--batch-check` reports a missing name on stdout and still exits 0,
    /// so a non-zero exit is a real failure.
    fn type_of(&self, rev: &str) -> Result<Option<ObjectType>, StoreError> {
        let input = format!("{rev}\n");
        let out = self.git("cat-file", &["--batch-check"], Some(input.as_bytes()))?;
        let line = String::from_utf8_lossy(&out);
        let line = line.trim_end();
        if line.ends_with(" missing") {
            return Ok(None);
        }
        // <id> <type> <size>
        match line.split(' ').collect::<Vec<_>>()[..] {
            [_, ty, _] => Ok(Some(ObjectType::from_name(ty))),
            _ => Err(StoreError::Command {
                command: "git cat-file --batch-check".to_string(),
                stderr: format!("unexpected output: {line}"),
            }),
        }
    }

    /// Object id of `reference`, matched by its exact full name. A bare
    /// `<ref>:<path>` would let git try `refs/heads/<ref>` and friends when
    /// `<ref>` itself does not exist.
    fn resolve_ref(&self, reference: &str) -> Result<Option<String>, StoreError> {
        let out = self.git(
            "for-each-ref",
            &["--format=%(objectname) %(refname)", reference],
            None,
        )?;
        let out = String::from_utf8_lossy(&out);
        Ok(out.lines().find_map(|line| {
            let (id, name) = line.split_once(' ')?;
            (name == reference).then(|| id.to_string())
        }))
    }
}

impl ObjectStore for GitCliStore {
    fn object_type(&self, id: &ObjectId) -> Result<ObjectType, StoreError> {
        let rev = id.to_hex();
        self.type_of(&rev)?.ok_or(StoreError::NotFound(rev))
    }

    fn read_object(&self, id: &ObjectId, expected: ObjectType) -> Result<Vec<u8>, StoreError> {
        // `cat-file <type>` would peel a tag to the requested type, so the
        // type is checked up front
        let found = self.object_type(id)?;
        if found != expected {
            return Err(StoreError::TypeMismatch {
                id: *id,
                expected,
                found,
            });
        }
        self.git("cat-file", &[expected.as_str(), &id.to_hex()], None)
    }

    fn read_blob_at(&self, reference: &str, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(tip) = self.resolve_ref(reference)? else {
            return Ok(None);
        };
        let rev = format!("{tip}:{path}");
        if self.type_of(&rev)? != Some(ObjectType::Blob) {
            return Ok(None);
        }
        self.git("cat-file", &["blob", &rev], None).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Repository;
    use tempfile::TempDir;

    const KEYS: &[u8] = include_bytes!("../../tests/fixtures/alice.pub");

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok()
    }

    /// Point `reference` at a commit whose tree holds `.ssh/authorized_keys`.
    fn commit_keys(repo: &Repository, reference: &str) {
        let blob = repo.blob(KEYS).unwrap();
        let mut ssh = repo.treebuilder(None).unwrap();
        ssh.insert("authorized_keys", blob, 0o100644).unwrap();
        let ssh = ssh.write().unwrap();
        let mut root = repo.treebuilder(None).unwrap();
        root.insert(".ssh", ssh, 0o040000).unwrap();
        let tree = repo.find_tree(root.write().unwrap()).unwrap();
        let sig = git2::Signature::new("Admin", "admin@example.com", &git2::Time::new(0, 0)).unwrap();
        repo.commit(Some(reference), &sig, &sig, "keys", &tree, &[])
            .unwrap();
    }

    #[test]
    fn test_cat_file_roundtrip() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        let oid = repo.blob(b"hello\n").unwrap();
        let id = ObjectId::from_hex(&oid.to_string()).unwrap();

        let store = GitCliStore::new(Some(dir.path().to_path_buf()));
        assert_eq!(store.object_type(&id).unwrap(), ObjectType::Blob);
        assert_eq!(store.read_object(&id, ObjectType::Blob).unwrap(), b"hello\n");
        assert!(matches!(
            store.read_object(&id, ObjectType::Commit),
            Err(StoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            store.object_type(&ObjectId::from_raw([0x42; 20])),
            Err(StoreError::NotFound(_))
        ));
        assert!(store
            .read_blob_at("refs/teams/@meta", ".ssh/authorized_keys")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_read_blob_at_present() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        commit_keys(&repo, "refs/teams/@meta");

        let store = GitCliStore::new(Some(dir.path().to_path_buf()));
        let keys = store
            .read_blob_at("refs/teams/@meta", ".ssh/authorized_keys")
            .unwrap();
        assert_eq!(keys.as_deref(), Some(KEYS));

        // missing path and non-blob entry under an existing ref
        assert!(store.read_blob_at("refs/teams/@meta", "missing").unwrap().is_none());
        assert!(store.read_blob_at("refs/teams/@meta", ".ssh").unwrap().is_none());
    }

    #[test]
    fn test_read_blob_at_matches_full_ref_name_only() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        // git would expand `refs/teams/@meta` to these if asked by short name
        commit_keys(&repo, "refs/heads/refs/teams/@meta");
        commit_keys(&repo, "refs/tags/refs/@meta");
        commit_keys(&repo, "refs/teams/@meta/extra");

        let store = GitCliStore::new(Some(dir.path().to_path_buf()));
        for reference in ["refs/teams/@meta", "refs/@meta"] {
            assert!(
                store
                    .read_blob_at(reference, ".ssh/authorized_keys")
                    .unwrap()
                    .is_none(),
                "{reference} resolved to another ref"
            );
        }
        assert!(store
            .read_blob_at("refs/heads/refs/teams/@meta", ".ssh/authorized_keys")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_git_failure_is_an_error() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let store = GitCliStore::new(Some(dir.path().join("not-a-repo")));

        assert!(matches!(
            store.read_blob_at("refs/@meta", ".ssh/authorized_keys"),
            Err(StoreError::Command { .. })
        ));
        assert!(matches!(
            store.object_type(&ObjectId::from_raw([0x42; 20])),
            Err(StoreError::Command { .. })
        ));
    }
}
