//! PEM-style armor around SSHSIG records.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Label used by `ssh-keygen -Y sign`.
pub const SIGNATURE_LABEL: &str = "SSH SIGNATURE";

/// ssh-keygen wraps the base64 body at 70 columns.
const LINE_WIDTH: usize = 70;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ArmorError {
    #[error("no armored block found")]
    Missing,

    #[error("wrong armor label: {found}, expected {expected}")]
    WrongLabel { found: String, expected: String },

    #[error("armored block is not terminated")]
    Unterminated,

    #[error("invalid base64 in armored block: {0}")]
    Base64(String),
}

pub fn begin_line(label: &str) -> String {
    format!("-----BEGIN {label}-----")
}

pub fn end_line(label: &str) -> String {
    format!("-----END {label}-----")
}

/// Strips the armor and returns the decoded binary payload of the first
/// block. Text before the BEGIN line is ignored.
pub fn unarmor(input: &[u8], label: &str) -> Result<Vec<u8>, ArmorError> {
    let text = String::from_utf8_lossy(input);
    let mut lines = text.lines().map(str::trim);

    let found = lines
        .by_ref()
        .find_map(|line| {
            line.strip_prefix("-----BEGIN ")
                .and_then(|rest| rest.strip_suffix("-----"))
        })
        .ok_or(ArmorError::Missing)?;
    if found != label {
        return Err(ArmorError::WrongLabel {
            found: found.to_string(),
            expected: label.to_string(),
        });
    }

    let end = end_line(label);
    let mut body = String::new();
    let mut terminated = false;
    for line in lines {
        if line == end {
            terminated = true;
            break;
        }
        body.push_str(line);
    }
    if !terminated {
        return Err(ArmorError::Unterminated);
    }

    BASE64
        .decode(body.as_bytes())
        .map_err(|e| ArmorError::Base64(e.to_string()))
}

/// Inverse of [`unarmor`]; output is byte-identical to ssh-keygen's.
pub fn armor(payload: &[u8], label: &str) -> String {
    let encoded = BASE64.encode(payload);
    let mut out = begin_line(label);
    out.push('\n');
    // base64 output is ASCII so byte chunks are valid str slices
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&end_line(label));
    out.push('\n');
    out
}
