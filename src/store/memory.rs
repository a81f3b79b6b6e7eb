use std::collections::HashMap;

use super::{ObjectStore, StoreError};
use crate::object::{ObjectId, ObjectType};

/// Objects and `<ref>:<path>` blobs held in memory. Object ids are computed
/// the way git computes them, so ids in hook input line up with real ones.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    objects: HashMap<ObjectId, (ObjectType, Vec<u8>)>,
    files: HashMap<(String, String), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object and return its id.
    pub fn insert(&mut self, ty: ObjectType, data: impl Into<Vec<u8>>) -> ObjectId {
        let data = data.into();
        let id = ObjectId::for_object(ty, &data);
        self.objects.insert(id, (ty, data));
        id
    }

    /// Make `data` readable at `<reference>:<path>`.
    pub fn put_file(&mut self, reference: &str, path: &str, data: impl Into<Vec<u8>>) {
        self.files
            .insert((reference.to_string(), path.to_string()), data.into());
    }

    pub fn remove_file(&mut self, reference: &str, path: &str) -> Option<Vec<u8>> {
        self.files
            .remove(&(reference.to_string(), path.to_string()))
    }
}

impl ObjectStore for MemoryStore {
    fn object_type(&self, id: &ObjectId) -> Result<ObjectType, StoreError> {
        self.objects
            .get(id)
            .map(|(ty, _)| *ty)
            .ok_or_else(|| StoreError::NotFound(id.to_hex()))
    }

    fn read_object(&self, id: &ObjectId, expected: ObjectType) -> Result<Vec<u8>, StoreError> {
        match self.objects.get(id) {
            Some((ty, data)) if *ty == expected => Ok(data.clone()),
            Some((ty, _)) => Err(StoreError::TypeMismatch {
                id: *id,
                expected,
                found: *ty,
            }),
            None => Err(StoreError::NotFound(id.to_hex())),
        }
    }

    fn read_blob_at(&self, reference: &str, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .files
            .get(&(reference.to_string(), path.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_uses_git_ids() {
        let mut store = MemoryStore::new();
        let id = store.insert(ObjectType::Blob, &b"hello\n"[..]);
        assert_eq!(id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert_eq!(store.object_type(&id).unwrap(), ObjectType::Blob);
        assert_eq!(store.read_object(&id, ObjectType::Blob).unwrap(), b"hello\n");
    }

    #[test]
    fn test_type_mismatch_and_missing() {
        let mut store = MemoryStore::new();
        let id = store.insert(ObjectType::Blob, &b"x"[..]);
        assert!(matches!(
            store.read_object(&id, ObjectType::Commit),
            Err(StoreError::TypeMismatch {
                found: ObjectType::Blob,
                ..
            })
        ));
        assert!(matches!(
            store.object_type(&ObjectId::ZERO),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_files() {
        let mut store = MemoryStore::new();
        store.put_file("refs/@meta", ".ssh/authorized_keys", "keys");
        assert_eq!(
            store
                .read_blob_at("refs/@meta", ".ssh/authorized_keys")
                .unwrap()
                .as_deref(),
            Some(&b"keys"[..])
        );
        assert!(store.read_blob_at("refs/@meta", "other").unwrap().is_none());

        store.remove_file("refs/@meta", ".ssh/authorized_keys");
        assert!(store
            .read_blob_at("refs/@meta", ".ssh/authorized_keys")
            .unwrap()
            .is_none());
    }
}
