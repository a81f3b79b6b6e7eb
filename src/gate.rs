//! The accept/reject decision for a pushed batch of ref updates.

use std::fmt;

use rayon::prelude::*;
use refguard_protocol::{DecodeError, PublicKey, SshSig, VerifyError};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::extract::{extract_commit, extract_tag, ExtractError};
use crate::hook::ReferenceUpdate;
use crate::object::ObjectType;
use crate::store::{ObjectStore, StoreError};
use crate::trust::TrustResolver;

/// Every ref a push may touch lives under this root.
pub const REF_ROOT: &str = "refs/";

/// Why a signed object was not accepted.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("signature could not be decoded: {0}")]
    Decode(#[from] DecodeError),

    #[error("signature namespace is {found:?}, expected {expected:?}")]
    WrongNamespace { expected: String, found: String },

    #[error("key {fingerprint} is not authorized for this ref")]
    UnauthorizedKey { fingerprint: String },

    #[error("signature verification failed: {0}")]
    BadSignature(VerifyError),

    #[error("{0} objects cannot be signed")]
    UnsupportedObjectType(ObjectType),

    #[error("tag contains unsigned text: {0}")]
    UnsignedText(#[from] ExtractError),

    #[error("tag is not signed")]
    NoSignature,
}

impl From<VerifyError> for Rejection {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::UnauthorizedKey { fingerprint } => {
                Rejection::UnauthorizedKey { fingerprint }
            }
            other => Rejection::BadSignature(other),
        }
    }
}

#[derive(Debug)]
pub enum Verdict {
    /// Signed by an authorized key.
    Valid,
    /// Deletion, nothing to verify.
    Absent,
    Invalid(Rejection),
    /// The repository could not answer. Never accepted.
    Unknown(StoreError),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Valid | Verdict::Absent)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Valid => f.write_str("valid signature"),
            Verdict::Absent => f.write_str("deleted"),
            Verdict::Invalid(rejection) => write!(f, "rejected: {rejection}"),
            Verdict::Unknown(err) => write!(f, "error: {err}"),
        }
    }
}

#[derive(Debug)]
pub struct UpdateOutcome {
    pub update: ReferenceUpdate,
    pub verdict: Verdict,
}

/// Verdicts for a whole push, in input order.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<UpdateOutcome>,
}

impl BatchReport {
    /// All-or-nothing: one bad update rejects the whole push.
    pub fn accepted(&self) -> bool {
        self.outcomes.iter().all(|o| o.verdict.is_accepted())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &UpdateOutcome> {
        self.outcomes.iter().filter(|o| !o.verdict.is_accepted())
    }
}

/// Errors that abort a batch before any update is checked.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("invalid ref name {0:?}: must start with refs/")]
    InvalidRefName(String),
}

/// Verify one signature over `signed`: it must decode, carry `namespace`,
/// come from a key `is_allowed` accepts, and check out cryptographically.
pub fn check_signature(
    signed: &[u8],
    armored: &[u8],
    namespace: &str,
    is_allowed: &dyn Fn(&PublicKey) -> bool,
) -> Result<(), Rejection> {
    let sig = SshSig::from_armored(armored)?;
    if sig.namespace != namespace {
        return Err(Rejection::WrongNamespace {
            expected: namespace.to_string(),
            found: sig.namespace,
        });
    }
    sig.verify_authorized(signed, is_allowed)?;
    Ok(())
}

/// A commit carries exactly one signature. An unsigned commit fails to
/// decode.
pub fn check_commit(
    object: &[u8],
    namespace: &str,
    is_allowed: &dyn Fn(&PublicKey) -> bool,
) -> Result<(), Rejection> {
    let message = extract_commit(object);
    check_signature(&message.signed, &message.armored, namespace, is_allowed)
}

/// A tag passes if any of its signatures does. All signatures are examined;
/// the failure reported is the last one seen. Unsigned text after a
/// signature rejects the tag outright.
pub fn check_tag(
    object: &[u8],
    namespace: &str,
    is_allowed: &dyn Fn(&PublicKey) -> bool,
) -> Result<(), Rejection> {
    let signatures = extract_tag(object).ok_or(Rejection::NoSignature)?;

    let mut valid = false;
    let mut last = Rejection::NoSignature;
    for message in signatures {
        let message = message?;
        match check_signature(&message.signed, &message.armored, namespace, is_allowed) {
            Ok(()) => valid = true,
            Err(rejection) => {
                debug!(reason = %rejection, "tag signature not accepted");
                last = rejection;
            }
        }
    }

    if valid {
        Ok(())
    } else {
        Err(last)
    }
}

type ObjectCheck = fn(&[u8], &str, &dyn Fn(&PublicKey) -> bool) -> Result<(), Rejection>;

pub struct Gate<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    resolver: TrustResolver<'a, S>,
    namespace: String,
    parallel: bool,
}

impl<'a, S: ObjectStore + ?Sized> Gate<'a, S> {
    pub fn new(store: &'a S, config: &Config) -> Self {
        Self {
            store,
            resolver: TrustResolver::new(store, config.metadata_layout(), config.trust_policy),
            namespace: config.namespace.clone(),
            parallel: config.parallel,
        }
    }

    pub fn check_update(&self, update: &ReferenceUpdate) -> Verdict {
        if update.is_deletion() {
            return Verdict::Absent;
        }

        let ty = match self.store.object_type(&update.to) {
            Ok(ty) => ty,
            Err(e) => return Verdict::Unknown(e),
        };
        let check: ObjectCheck = match ty {
            ObjectType::Commit => check_commit,
            ObjectType::Tag => check_tag,
            other => return Verdict::Invalid(Rejection::UnsupportedObjectType(other)),
        };

        let object = match self.store.read_object(&update.to, ty) {
            Ok(object) => object,
            Err(e) => return Verdict::Unknown(e),
        };
        let keys = match self.resolver.resolve(&update.refname) {
            Ok(keys) => keys,
            Err(e) => return Verdict::Unknown(e),
        };
        if keys.is_empty() {
            debug!(refname = %update.refname, "no authorized keys on path");
        }

        match check(&object, &self.namespace, &|key: &PublicKey| keys.contains(key)) {
            Ok(()) => Verdict::Valid,
            Err(rejection) => Verdict::Invalid(rejection),
        }
    }

    /// Check every update. Ref names are validated up front; the batch
    /// verdict is only formed once every update has one.
    pub fn evaluate(&self, updates: &[ReferenceUpdate]) -> Result<BatchReport, BatchError> {
        if let Some(bad) = updates.iter().find(|u| !u.refname.starts_with(REF_ROOT)) {
            return Err(BatchError::InvalidRefName(bad.refname.clone()));
        }

        let verdicts: Vec<Verdict> = if self.parallel {
            updates.par_iter().map(|u| self.check_update(u)).collect()
        } else {
            updates.iter().map(|u| self.check_update(u)).collect()
        };

        let outcomes: Vec<UpdateOutcome> = updates
            .iter()
            .cloned()
            .zip(verdicts)
            .map(|(update, verdict)| {
                if verdict.is_accepted() {
                    info!(refname = %update.refname, to = %update.to, %verdict, "accepted");
                } else {
                    warn!(refname = %update.refname, to = %update.to, %verdict, "rejected");
                }
                UpdateOutcome { update, verdict }
            })
            .collect();

        Ok(BatchReport { outcomes })
    }
}
