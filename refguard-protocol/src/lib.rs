//! Decoding and verification of SSH signatures (`ssh-keygen -Y sign`
//! output) as embedded in git commits and tags.

pub mod armor;
pub mod error;
pub mod hash;
pub mod key;
pub mod sshsig;
pub mod wire;

pub use error::{DecodeError, KeyError, VerifyError};
pub use hash::HashAlgorithm;
pub use key::{parse_authorized_keys, AuthorizedKey, PublicKey};
pub use sshsig::{signed_data, RawSignature, SshSig, GIT_NAMESPACE};
pub use wire::WireError;
