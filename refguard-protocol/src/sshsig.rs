//! SSHSIG records (OpenSSH PROTOCOL.sshsig).
//!
//! Armored payload layout:
//!
//! ```text
//! byte[6]  "SSHSIG"
//! uint32   version (1)
//! string   public key blob
//! string   namespace
//! string   reserved
//! string   hash algorithm name
//! string   signature blob = { string format, string signature bytes }
//! ```
//!
//! What actually gets signed is not the message but a wrapper binding the
//! namespace to a digest of the message, see [`signed_data`].

use ed25519_dalek::Signer;

use crate::armor::{self, SIGNATURE_LABEL};
use crate::error::{DecodeError, VerifyError};
use crate::hash::HashAlgorithm;
use crate::key::{self, PublicKey};
use crate::wire::{Reader, Writer};

pub const MAGIC_PREAMBLE: &[u8; 6] = b"SSHSIG";
pub const SIG_VERSION: u32 = 1;

/// Namespace git uses for commit and tag signatures.
pub const GIT_NAMESPACE: &str = "git";

/// The nested `{format, bytes}` signature produced by the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSignature {
    pub format: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSig {
    pub public_key: PublicKey,
    pub namespace: String,
    pub reserved: Vec<u8>,
    pub hash_algorithm: HashAlgorithm,
    pub signature: RawSignature,
}

impl SshSig {
    /// Decode an armored signature block.
    pub fn from_armored(input: &[u8]) -> Result<Self, DecodeError> {
        let payload = armor::unarmor(input, SIGNATURE_LABEL)?;
        Self::decode(&payload)
    }

    /// Decode the binary payload of an armored signature.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(payload);

        let magic = r.read_array::<6>()?;
        if &magic != MAGIC_PREAMBLE {
            return Err(DecodeError::BadMagic(magic.to_vec()));
        }
        let version = r.read_u32()?;
        if version != SIG_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let key_blob = r.read_string()?;
        let namespace = r.read_utf8()?.to_string();
        let reserved = r.read_string()?.to_vec();
        let hash_name = r.read_utf8()?;
        let hash_algorithm = HashAlgorithm::from_name(hash_name)
            .ok_or_else(|| DecodeError::UnsupportedHashAlgorithm(hash_name.to_string()))?;
        let sig_blob = r.read_string()?;
        r.finish()?;

        let mut sr = Reader::new(sig_blob);
        let signature = RawSignature {
            format: sr.read_utf8()?.to_string(),
            bytes: sr.read_string()?.to_vec(),
        };
        sr.finish()?;

        let public_key = PublicKey::from_wire(key_blob)?;

        Ok(Self {
            public_key,
            namespace,
            reserved,
            hash_algorithm,
            signature,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut sig_blob = Writer::new();
        sig_blob
            .put_string(&self.signature.format)
            .put_string(&self.signature.bytes);

        let mut w = Writer::new();
        w.put_raw(MAGIC_PREAMBLE)
            .put_u32(SIG_VERSION)
            .put_string(self.public_key.to_wire())
            .put_string(&self.namespace)
            .put_string(&self.reserved)
            .put_string(self.hash_algorithm.name())
            .put_string(sig_blob.into_bytes());
        w.into_bytes()
    }

    pub fn to_armored(&self) -> String {
        armor::armor(&self.encode(), SIGNATURE_LABEL)
    }

    /// Check the signature over `message`. Says nothing about whether the
    /// key should be trusted.
    pub fn verify(&self, message: &[u8]) -> Result<(), VerifyError> {
        let digest = self.hash_algorithm.digest(message);
        let data = signed_data(&self.namespace, self.hash_algorithm, &digest);
        self.public_key
            .verify_raw(&data, &self.signature.format, &self.signature.bytes)
    }

    /// Check that `is_allowed` accepts the signing key, then verify.
    pub fn verify_authorized<F>(&self, message: &[u8], is_allowed: F) -> Result<(), VerifyError>
    where
        F: Fn(&PublicKey) -> bool,
    {
        if !is_allowed(&self.public_key) {
            return Err(VerifyError::UnauthorizedKey {
                fingerprint: self.public_key.fingerprint(),
            });
        }
        self.verify(message)
    }

    /// Sign `message` with an Ed25519 key, as `ssh-keygen -Y sign` would.
    pub fn sign_ed25519(
        signing_key: &ed25519_dalek::SigningKey,
        namespace: &str,
        hash_algorithm: HashAlgorithm,
        message: &[u8],
    ) -> Self {
        let digest = hash_algorithm.digest(message);
        let data = signed_data(namespace, hash_algorithm, &digest);
        let signature = signing_key.sign(&data);

        Self {
            public_key: PublicKey::Ed25519(signing_key.verifying_key().to_bytes()),
            namespace: namespace.to_string(),
            reserved: Vec::new(),
            hash_algorithm,
            signature: RawSignature {
                format: key::ED25519.to_string(),
                bytes: signature.to_bytes().to_vec(),
            },
        }
    }
}

/// The blob a key actually signs: magic, namespace, empty reserved field,
/// hash algorithm name and the message digest.
pub fn signed_data(namespace: &str, hash_algorithm: HashAlgorithm, digest: &[u8]) -> Vec<u8> {
    let mut w = Writer::new();
    w.put_raw(MAGIC_PREAMBLE)
        .put_string(namespace)
        .put_string(b"")
        .put_string(hash_algorithm.name())
        .put_string(digest);
    w.into_bytes()
}
