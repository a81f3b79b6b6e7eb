//! Split raw commit and tag objects into the bytes that were signed and the
//! armored signature embedded in them. Everything here is byte-exact: one
//! byte of drift and verification fails.

use refguard_protocol::armor::{self, SIGNATURE_LABEL};

/// Commit header carrying the signature for SHA-1 repositories.
const SIGNATURE_HEADER: &[u8] = b"gpgsig ";

/// Signature headers for other hash algorithms. They are excluded from the
/// signed payload but never used as the signature.
const OTHER_SIGNATURE_HEADERS: &[&[u8]] = &[b"gpgsig-sha256 "];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    /// Exact bytes the signer signed.
    pub signed: Vec<u8>,
    /// Armored signature block, possibly empty or malformed.
    pub armored: Vec<u8>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("{len} bytes of unsigned text follow a signature at offset {offset}")]
    UnsignedText { offset: usize, len: usize },
}

/// Remove the `gpgsig` header (and its space-prefixed continuation lines)
/// from a commit. An unsigned commit yields an empty armored block.
pub fn extract_commit(object: &[u8]) -> SignedMessage {
    let (headers, body) = match find_subslice(object, b"\n\n") {
        Some(pos) => object.split_at(pos + 1),
        None => (object, &[][..]),
    };

    let mut signed = Vec::with_capacity(object.len());
    let mut armored = Vec::new();
    // None: regular header, Some(true): our signature, Some(false): other sig
    let mut in_signature: Option<bool> = None;

    for line in headers.split_inclusive(|b| *b == b'\n') {
        if let Some(value) = line.strip_prefix(SIGNATURE_HEADER) {
            in_signature = Some(true);
            armored.extend_from_slice(value);
        } else if OTHER_SIGNATURE_HEADERS.iter().any(|h| line.starts_with(h)) {
            in_signature = Some(false);
        } else if let (Some(ours), Some(rest)) = (in_signature, line.strip_prefix(b" ")) {
            if ours {
                armored.extend_from_slice(rest);
            }
        } else {
            in_signature = None;
            signed.extend_from_slice(line);
        }
    }
    signed.extend_from_slice(body);

    SignedMessage { signed, armored }
}

/// Iterate over the signature blocks trailing a tag object. Returns `None`
/// when the tag carries no signature block at all.
pub fn extract_tag(object: &[u8]) -> Option<TagSignatures<'_>> {
    let begin = armor::begin_line(SIGNATURE_LABEL);
    let has_signature = object
        .split(|b| *b == b'\n')
        .any(|line| line == begin.as_bytes());
    has_signature.then(|| TagSignatures::new(object))
}

/// Lazily yields one [`SignedMessage`] per signature block, in order.
///
/// Every signature covers all non-signature text that precedes it, so
/// consecutive blocks sign the same payload. Text found after a signature
/// block would not be covered by the earlier signatures and is reported as
/// [`ExtractError::UnsignedText`], after which the iterator is exhausted.
#[derive(Debug)]
pub struct TagSignatures<'a> {
    object: &'a [u8],
    pos: usize,
    signed: Vec<u8>,
    seen_signature: bool,
    done: bool,
    begin: String,
    end: String,
}

impl<'a> TagSignatures<'a> {
    fn new(object: &'a [u8]) -> Self {
        Self {
            object,
            pos: 0,
            signed: Vec::new(),
            seen_signature: false,
            done: false,
            begin: armor::begin_line(SIGNATURE_LABEL),
            end: armor::end_line(SIGNATURE_LABEL),
        }
    }

    /// Next line including its newline, advancing the cursor.
    fn next_line(&mut self) -> Option<&'a [u8]> {
        let rest = &self.object[self.pos..];
        if rest.is_empty() {
            return None;
        }
        let len = rest
            .iter()
            .position(|b| *b == b'\n')
            .map_or(rest.len(), |i| i + 1);
        self.pos += len;
        Some(&rest[..len])
    }

    fn is_marker(line: &[u8], marker: &str) -> bool {
        line.strip_suffix(b"\n").unwrap_or(line) == marker.as_bytes()
    }
}

impl Iterator for TagSignatures<'_> {
    type Item = Result<SignedMessage, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let text_start = self.pos;
        let mut text = Vec::new();
        while let Some(line) = self.next_line() {
            if !Self::is_marker(line, &self.begin) {
                text.extend_from_slice(line);
                continue;
            }

            if self.seen_signature && !text.is_empty() {
                self.done = true;
                return Some(Err(ExtractError::UnsignedText {
                    offset: text_start,
                    len: text.len(),
                }));
            }
            self.signed.append(&mut text);

            let mut armored = line.to_vec();
            while let Some(line) = self.next_line() {
                armored.extend_from_slice(line);
                if Self::is_marker(line, &self.end) {
                    break;
                }
            }
            self.seen_signature = true;
            return Some(Ok(SignedMessage {
                signed: self.signed.clone(),
                armored,
            }));
        }

        self.done = true;
        if self.seen_signature && !text.is_empty() {
            return Some(Err(ExtractError::UnsignedText {
                offset: text_start,
                len: text.len(),
            }));
        }
        None
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
