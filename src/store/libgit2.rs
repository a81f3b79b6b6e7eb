use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use git2::{ErrorCode, Oid, Repository};

use super::{ObjectStore, StoreError};
use crate::object::{ObjectId, ObjectType};

/// Object access through libgit2.
///
/// `git2::Repository` is `Send` but not `Sync`, so the handle sits behind a
/// mutex. Every call is a short one-shot read.
pub struct GitRepoStore {
    repo: Mutex<Repository>,
}

impl GitRepoStore {
    pub fn open(git_dir: &Path) -> Result<Self, StoreError> {
        Ok(Self::from_repository(Repository::open(git_dir)?))
    }

    /// Open the repository described by `GIT_DIR` and friends. Inside a
    /// pre-receive hook this also picks up the quarantine object directory
    /// holding the pushed objects.
    pub fn open_from_env() -> Result<Self, StoreError> {
        Ok(Self::from_repository(Repository::open_from_env()?))
    }

    pub fn from_repository(repo: Repository) -> Self {
        Self {
            repo: Mutex::new(repo),
        }
    }

    fn repo(&self) -> Result<MutexGuard<'_, Repository>, StoreError> {
        self.repo.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn to_oid(id: &ObjectId) -> Result<Oid, StoreError> {
    Ok(Oid::from_bytes(id.as_bytes())?)
}

fn from_git_type(ty: git2::ObjectType) -> ObjectType {
    match ty {
        git2::ObjectType::Commit => ObjectType::Commit,
        git2::ObjectType::Tree => ObjectType::Tree,
        git2::ObjectType::Blob => ObjectType::Blob,
        git2::ObjectType::Tag => ObjectType::Tag,
        git2::ObjectType::Any => ObjectType::Invalid,
    }
}

fn not_found_as_none<T>(result: Result<T, git2::Error>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl ObjectStore for GitRepoStore {
    fn object_type(&self, id: &ObjectId) -> Result<ObjectType, StoreError> {
        let repo = self.repo()?;
        let odb = repo.odb()?;
        match not_found_as_none(odb.read_header(to_oid(id)?))? {
            Some((_, ty)) => Ok(from_git_type(ty)),
            None => Err(StoreError::NotFound(id.to_hex())),
        }
    }

    fn read_object(&self, id: &ObjectId, expected: ObjectType) -> Result<Vec<u8>, StoreError> {
        let repo = self.repo()?;
        let odb = repo.odb()?;
        let object = not_found_as_none(odb.read(to_oid(id)?))?
            .ok_or_else(|| StoreError::NotFound(id.to_hex()))?;

        let found = from_git_type(object.kind());
        if found != expected {
            return Err(StoreError::TypeMismatch {
                id: *id,
                expected,
                found,
            });
        }
        Ok(object.data().to_vec())
    }

    fn read_blob_at(&self, reference: &str, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let repo = self.repo()?;
        let Some(reference) = not_found_as_none(repo.find_reference(reference))? else {
            return Ok(None);
        };
        let tree = reference.peel_to_tree()?;
        let Some(entry) = not_found_as_none(tree.get_path(Path::new(path)))? else {
            return Ok(None);
        };
        if entry.kind() != Some(git2::ObjectType::Blob) {
            return Ok(None);
        }
        let blob = repo.find_blob(entry.id())?;
        Ok(Some(blob.content().to_vec()))
    }
}
