//! Which keys may sign updates to a ref.
//!
//! Keys are granted per namespace: the `authorized_keys` blob found at
//! `<prefix>/@meta:.ssh/authorized_keys` applies to every ref below
//! `<prefix>`. For `refs/teams/x/main` the candidates are, most specific
//! first, `refs/teams/x/@meta`, `refs/teams/@meta` and `refs/@meta`.

use std::collections::BTreeMap;
use std::fmt;

use refguard_protocol::{parse_authorized_keys, PublicKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::store::{ObjectStore, StoreError};

pub const DEFAULT_METADATA_REF: &str = "@meta";
pub const DEFAULT_METADATA_PATH: &str = ".ssh/authorized_keys";

/// How metadata files along the namespace path combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustPolicy {
    /// Every ancestor namespace contributes its keys.
    #[default]
    Union,
    /// Only the most specific metadata file that exists counts.
    Nearest,
}

/// Where metadata lives relative to a namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataLayout {
    /// Last segment of the metadata ref, appended to the prefix.
    pub reference_segment: String,
    /// Path of the keys blob inside the metadata ref's tree.
    pub path: String,
}

impl Default for MetadataLayout {
    fn default() -> Self {
        Self {
            reference_segment: DEFAULT_METADATA_REF.to_string(),
            path: DEFAULT_METADATA_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataLocation {
    pub reference: String,
    pub path: String,
}

impl fmt::Display for MetadataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.reference, self.path)
    }
}

/// Candidate metadata locations for `refname`, most specific first. The
/// final segment names the ref itself and never forms a prefix.
pub fn metadata_paths(refname: &str, layout: &MetadataLayout) -> Vec<MetadataLocation> {
    let segments: Vec<&str> = refname.split('/').collect();
    let namespaces = &segments[..segments.len().saturating_sub(1)];

    (1..=namespaces.len())
        .rev()
        .map(|depth| MetadataLocation {
            reference: format!("{}/{}", namespaces[..depth].join("/"), layout.reference_segment),
            path: layout.path.clone(),
        })
        .collect()
}

/// Public keys keyed by their canonical wire encoding, so comments and
/// options never affect membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizedKeySet {
    keys: BTreeMap<Vec<u8>, PublicKey>,
}

impl AuthorizedKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse authorized_keys text. Lines that do not parse are logged and
    /// skipped, they never invalidate the rest of the file.
    pub fn from_authorized_keys(text: &str, source: &str) -> Self {
        let mut set = Self::new();
        for (line, parsed) in parse_authorized_keys(text) {
            match parsed {
                Ok(entry) => {
                    set.insert(entry.key);
                }
                Err(e) => warn!(source, line, error = %e, "ignoring authorized key line"),
            }
        }
        set
    }

    /// Returns false if the key was already present.
    pub fn insert(&mut self, key: PublicKey) -> bool {
        self.keys.insert(key.to_wire(), key).is_none()
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.keys.contains_key(&key.to_wire())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn union(mut self, other: AuthorizedKeySet) -> Self {
        self.keys.extend(other.keys);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &PublicKey> {
        self.keys.values()
    }
}

impl FromIterator<PublicKey> for AuthorizedKeySet {
    fn from_iter<I: IntoIterator<Item = PublicKey>>(iter: I) -> Self {
        let mut set = Self::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

pub struct TrustResolver<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    layout: MetadataLayout,
    policy: TrustPolicy,
}

impl<'a, S: ObjectStore + ?Sized> TrustResolver<'a, S> {
    pub fn new(store: &'a S, layout: MetadataLayout, policy: TrustPolicy) -> Self {
        Self {
            store,
            layout,
            policy,
        }
    }

    /// Keys allowed to sign updates to `refname`. No metadata anywhere on
    /// the path gives an empty set, which authorizes nothing.
    pub fn resolve(&self, refname: &str) -> Result<AuthorizedKeySet, StoreError> {
        let mut found = metadata_paths(refname, &self.layout)
            .into_iter()
            .filter_map(|location| self.read_keys(&location).transpose());

        match self.policy {
            TrustPolicy::Union => found.try_fold(AuthorizedKeySet::new(), |acc, keys| {
                Ok::<_, StoreError>(acc.union(keys?))
            }),
            TrustPolicy::Nearest => Ok(found.next().transpose()?.unwrap_or_default()),
        }
    }

    fn read_keys(
        &self,
        location: &MetadataLocation,
    ) -> Result<Option<AuthorizedKeySet>, StoreError> {
        let Some(blob) = self
            .store
            .read_blob_at(&location.reference, &location.path)?
        else {
            trace!(%location, "no metadata");
            return Ok(None);
        };

        let source = location.to_string();
        let keys = AuthorizedKeySet::from_authorized_keys(&String::from_utf8_lossy(&blob), &source);
        for key in keys.iter() {
            debug!(%location, key = %key, "key granted");
        }
        Ok(Some(keys))
    }
}
