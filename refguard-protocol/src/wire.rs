//! SSH wire encoding (RFC 4251 section 5) as used by SSHSIG records and
//! public key blobs:
//! - uint32: 4 bytes big endian
//! - string: [len: u32 BE][len bytes]
//! - mpint:  string holding a two's complement big endian integer
//!
//! Every length is checked against the remaining input before slicing, so a
//! hostile length prefix can only produce a `WireError`.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected end of data: needed {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),

    #[error("field is not valid UTF-8")]
    Utf8,

    #[error("negative mpint")]
    NegativeMpint,
}

/// Cursor over a borrowed wire record.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if n > self.buf.len() {
            return Err(WireError::Truncated {
                needed: n,
                remaining: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.read_array::<4>()?))
    }

    pub fn read_string(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    pub fn read_utf8(&mut self) -> Result<&'a str, WireError> {
        std::str::from_utf8(self.read_string()?).map_err(|_| WireError::Utf8)
    }

    /// Reads an mpint and strips the sign-padding zero, returning the
    /// unsigned big endian magnitude.
    pub fn read_mpint(&mut self) -> Result<&'a [u8], WireError> {
        let raw = self.read_string()?;
        match raw.first() {
            Some(b) if b & 0x80 != 0 => Err(WireError::NegativeMpint),
            Some(0) => Ok(&raw[1..]),
            _ => Ok(raw),
        }
    }

    /// Fails unless the whole record has been consumed.
    pub fn finish(self) -> Result<(), WireError> {
        match self.buf.len() {
            0 => Ok(()),
            n => Err(WireError::TrailingBytes(n)),
        }
    }
}

/// Append-only builder for wire records.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_string(&mut self, bytes: impl AsRef<[u8]>) -> &mut Self {
        let bytes = bytes.as_ref();
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Writes an unsigned big endian magnitude as an mpint.
    pub fn put_mpint(&mut self, magnitude: &[u8]) -> &mut Self {
        let start = magnitude
            .iter()
            .position(|b| *b != 0)
            .unwrap_or(magnitude.len());
        let trimmed = &magnitude[start..];
        if trimmed.first().is_some_and(|b| b & 0x80 != 0) {
            self.put_u32(trimmed.len() as u32 + 1);
            self.buf.push(0);
            self.buf.extend_from_slice(trimmed);
            self
        } else {
            self.put_string(trimmed)
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
