//! Error types for decoding and verifying SSH signatures.

use crate::armor::ArmorError;
use crate::wire::WireError;

/// Public key parse errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("malformed key encoding: {0}")]
    Wire(#[from] WireError),

    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid {algorithm} key length: {len}")]
    InvalidLength { algorithm: &'static str, len: usize },

    #[error("key type {declared} does not match encoded type {encoded}")]
    AlgorithmMismatch { declared: String, encoded: String },

    #[error("invalid base64 key material: {0}")]
    Base64(String),

    #[error("malformed authorized key line: {0}")]
    Malformed(&'static str),
}

/// Any structural problem with an armored signature. No partially decoded
/// signature is ever returned alongside one of these.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error(transparent)]
    Armor(#[from] ArmorError),

    #[error("malformed signature record: {0}")]
    Wire(#[from] WireError),

    #[error("invalid magic header: {0:?}")]
    BadMagic(Vec<u8>),

    #[error("unsupported signature version: {0}")]
    UnsupportedVersion(u32),

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),

    #[error("invalid public key: {0}")]
    Key(#[from] KeyError),
}

/// Reasons a decoded signature fails to verify.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("key {fingerprint} is not authorized")]
    UnauthorizedKey { fingerprint: String },

    #[error("signature format {format} cannot be used with {algorithm} keys")]
    UnsupportedFormat {
        format: String,
        algorithm: &'static str,
    },

    #[error("unusable public key: {0}")]
    InvalidKey(String),

    #[error("signature does not match")]
    Mismatch,
}
