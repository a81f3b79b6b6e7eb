use sha1::{Digest, Sha1};
use std::{fmt, str::FromStr};

/// Width of a SHA-1 object id in bytes.
pub const OID_LEN: usize = 20;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ObjectIdError {
    #[error("expected {expected} hex characters, got {found}")]
    Length { expected: usize, found: usize },

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Content address of a git object (legacy SHA-1 scheme).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OID_LEN]);

impl ObjectId {
    /// All-zero id: "no object", the target of a deletion.
    pub const ZERO: ObjectId = ObjectId([0u8; OID_LEN]);

    pub fn from_raw(bytes: [u8; OID_LEN]) -> Self {
        ObjectId(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, ObjectIdError> {
        if s.len() != OID_LEN * 2 {
            return Err(ObjectIdError::Length {
                expected: OID_LEN * 2,
                found: s.len(),
            });
        }
        let mut bytes = [0u8; OID_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(ObjectId(bytes))
    }

    /// Id git assigns to an object: SHA-1 of "<type> <len>\0<data>".
    pub fn for_object(ty: ObjectType, data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(format!("{} {}\0", ty.as_str(), data.len()).as_bytes());
        hasher.update(data);
        ObjectId(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; OID_LEN] {
        &self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

/// Git object types. `Invalid` covers anything the store reports that is
/// not one of the four real types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
    Invalid,
}

impl ObjectType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "commit" => ObjectType::Commit,
            "tree" => ObjectType::Tree,
            "blob" => ObjectType::Blob,
            "tag" => ObjectType::Tag,
            _ => ObjectType::Invalid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::Tree => "tree",
            ObjectType::Blob => "blob",
            ObjectType::Tag => "tag",
            ObjectType::Invalid => "invalid",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
