//! Read-only access to the objects and refs of the repository receiving
//! the push.

mod git;
mod libgit2;
mod memory;

pub use git::GitCliStore;
pub use libgit2::GitRepoStore;
pub use memory::MemoryStore;

use crate::object::{ObjectId, ObjectType};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object {id} is a {found}, expected a {expected}")]
    TypeMismatch {
        id: ObjectId,
        expected: ObjectType,
        found: ObjectType,
    },

    #[error("libgit2 error: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("repository handle poisoned by a panicking thread")]
    Poisoned,
}

/// Everything the gate needs from a repository. Implementations must be
/// shareable across threads since updates may be checked in parallel.
pub trait ObjectStore: Sync {
    /// Type of the object `id`, `NotFound` if the store lacks it.
    fn object_type(&self, id: &ObjectId) -> Result<ObjectType, StoreError>;

    /// Raw (uncompressed, headerless) bytes of `id`, which must have type
    /// `expected`.
    fn read_object(&self, id: &ObjectId, expected: ObjectType) -> Result<Vec<u8>, StoreError>;

    /// Contents of the blob at `path` in the tree of `reference` (the
    /// `<ref>:<path>` revision syntax). `None` if either does not exist.
    fn read_blob_at(&self, reference: &str, path: &str) -> Result<Option<Vec<u8>>, StoreError>;
}
