//! SSH public keys: wire blobs, authorized_keys lines, raw signature checks.

use base64::{
    engine::general_purpose::{STANDARD as BASE64, STANDARD_NO_PAD as BASE64_NO_PAD},
    Engine,
};
use ed25519_dalek::Verifier;
use rsa::{pkcs1v15, traits::PublicKeyParts, BigUint, RsaPublicKey};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

use crate::error::{KeyError, VerifyError};
use crate::wire::{Reader, Writer};

pub const ED25519: &str = "ssh-ed25519";
pub const RSA: &str = "ssh-rsa";

const RSA_SHA2_256: &str = "rsa-sha2-256";
const RSA_SHA2_512: &str = "rsa-sha2-512";

const MIN_RSA_BITS: usize = 1024;
const MAX_RSA_BITS: usize = 16384;

/// Key types that may start an authorized_keys line. Used to tell an
/// options field apart from the key type; only ed25519 and rsa parse.
const KNOWN_KEY_TYPES: &[&str] = &[
    ED25519,
    RSA,
    "ssh-dss",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "sk-ssh-ed25519@openssh.com",
    "sk-ecdsa-sha2-nistp256@openssh.com",
];

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum PublicKey {
    Ed25519([u8; 32]),
    /// Unsigned big endian exponent and modulus.
    Rsa { e: Vec<u8>, n: Vec<u8> },
}

impl PublicKey {
    /// Parse the standard SSH public key blob.
    pub fn from_wire(blob: &[u8]) -> Result<Self, KeyError> {
        let mut r = Reader::new(blob);
        let algorithm = r.read_utf8()?;
        let key = match algorithm {
            ED25519 => {
                let raw = r.read_string()?;
                let bytes: [u8; 32] = raw.try_into().map_err(|_| KeyError::InvalidLength {
                    algorithm: ED25519,
                    len: raw.len(),
                })?;
                PublicKey::Ed25519(bytes)
            }
            RSA => {
                let e = r.read_mpint()?.to_vec();
                let n = r.read_mpint()?.to_vec();
                if n.is_empty() || e.is_empty() {
                    return Err(KeyError::InvalidLength {
                        algorithm: RSA,
                        len: n.len(),
                    });
                }
                PublicKey::Rsa { e, n }
            }
            other => return Err(KeyError::UnsupportedAlgorithm(other.to_string())),
        };
        r.finish()?;
        Ok(key)
    }

    /// Canonical wire encoding: algorithm name and key material only.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_string(self.algorithm());
        match self {
            PublicKey::Ed25519(bytes) => {
                w.put_string(bytes);
            }
            PublicKey::Rsa { e, n } => {
                w.put_mpint(e).put_mpint(n);
            }
        }
        w.into_bytes()
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            PublicKey::Ed25519(_) => ED25519,
            PublicKey::Rsa { .. } => RSA,
        }
    }

    /// `SHA256:<base64>` as printed by `ssh-keygen -l`.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.to_wire());
        format!("SHA256:{}", BASE64_NO_PAD.encode(digest))
    }

    /// The `<type> <base64>` form used in authorized_keys files.
    pub fn to_openssh(&self) -> String {
        format!("{} {}", self.algorithm(), BASE64.encode(self.to_wire()))
    }

    /// Check a raw SSH signature (`format` + `signature` bytes) over `message`.
    pub fn verify_raw(
        &self,
        message: &[u8],
        format: &str,
        signature: &[u8],
    ) -> Result<(), VerifyError> {
        match self {
            PublicKey::Ed25519(bytes) => {
                if format != ED25519 {
                    return Err(self.format_error(format));
                }
                let key = ed25519_dalek::VerifyingKey::from_bytes(bytes)
                    .map_err(|e| VerifyError::InvalidKey(e.to_string()))?;
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| VerifyError::Mismatch)?;
                key.verify(message, &sig).map_err(|_| VerifyError::Mismatch)
            }
            PublicKey::Rsa { e, n } => {
                let key = RsaPublicKey::new_with_max_size(
                    BigUint::from_bytes_be(n),
                    BigUint::from_bytes_be(e),
                    MAX_RSA_BITS,
                )
                .map_err(|e| VerifyError::InvalidKey(e.to_string()))?;
                if key.size() * 8 < MIN_RSA_BITS {
                    return Err(VerifyError::InvalidKey(format!(
                        "rsa modulus smaller than {MIN_RSA_BITS} bits"
                    )));
                }
                let sig = pkcs1v15::Signature::try_from(signature)
                    .map_err(|_| VerifyError::Mismatch)?;
                let result = match format {
                    RSA_SHA2_256 => {
                        rsa::signature::Verifier::verify(
                            &pkcs1v15::VerifyingKey::<Sha256>::new(key),
                            message,
                            &sig,
                        )
                    }
                    RSA_SHA2_512 => {
                        rsa::signature::Verifier::verify(
                            &pkcs1v15::VerifyingKey::<Sha512>::new(key),
                            message,
                            &sig,
                        )
                    }
                    _ => return Err(self.format_error(format)),
                };
                result.map_err(|_| VerifyError::Mismatch)
            }
        }
    }

    fn format_error(&self, format: &str) -> VerifyError {
        VerifyError::UnsupportedFormat {
            format: format.to_string(),
            algorithm: self.algorithm(),
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} {})", self.algorithm(), self.fingerprint())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.algorithm(), self.fingerprint())
    }
}

/// One parsed line of an authorized_keys file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedKey {
    pub options: Option<String>,
    pub key: PublicKey,
    pub comment: String,
}

impl AuthorizedKey {
    /// Parse `[options] <type> <base64> [comment]`.
    pub fn parse(line: &str) -> Result<Self, KeyError> {
        let line = line.trim();
        let (first, rest) = split_field(line);
        if first.is_empty() {
            return Err(KeyError::Malformed("empty line"));
        }

        let (options, key_type, rest) = if KNOWN_KEY_TYPES.contains(&first) {
            (None, first, rest)
        } else {
            let (key_type, rest) = split_field(rest);
            (Some(first.to_string()), key_type, rest)
        };

        if key_type.is_empty() {
            return Err(KeyError::Malformed("missing key type"));
        }
        if !KNOWN_KEY_TYPES.contains(&key_type) {
            return Err(KeyError::UnsupportedAlgorithm(key_type.to_string()));
        }

        let (material, comment) = split_field(rest);
        if material.is_empty() {
            return Err(KeyError::Malformed("missing key material"));
        }
        let blob = BASE64
            .decode(material)
            .map_err(|e| KeyError::Base64(e.to_string()))?;
        let key = PublicKey::from_wire(&blob)?;
        if key.algorithm() != key_type {
            return Err(KeyError::AlgorithmMismatch {
                declared: key_type.to_string(),
                encoded: key.algorithm().to_string(),
            });
        }

        Ok(Self {
            options,
            key,
            comment: comment.trim().to_string(),
        })
    }
}

/// Parse every key line of an authorized_keys file. Blank lines and
/// comments are skipped; each remaining line yields its 1-based number and
/// its parse result so callers can report and skip bad lines.
pub fn parse_authorized_keys(
    text: &str,
) -> impl Iterator<Item = (usize, Result<AuthorizedKey, KeyError>)> + '_ {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| (n, AuthorizedKey::parse(line)))
}

/// Split off the first whitespace-delimited field. Whitespace inside double
/// quotes (option values like `command="a b"`) does not end the field.
fn split_field(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => return (&s[..i], &s[i..]),
            _ => {}
        }
    }
    (s, "")
}
