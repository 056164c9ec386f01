//! POSIX PAX extended header records.
//!
//! Each record is `"<len> <keyword>=<value>\n"` where `<len>` counts every
//! byte of the record, its own digits included.

use std::fmt;

/// Keywords this encoder knows how to override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaxKeyword {
    Size,
    Path,
}

impl PaxKeyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Path => "path",
        }
    }
}

impl fmt::Display for PaxKeyword {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `keyword=value` record of a PAX extended header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaxExtendedHeader {
    keyword: PaxKeyword,
    value: String,
}

impl PaxExtendedHeader {
    pub fn new<V: Into<String>>(keyword: PaxKeyword, value: V) -> Self {
        Self {
            keyword,
            value: value.into(),
        }
    }
    /// Exact entry size, for sizes the legacy field cannot hold.
    pub fn size(size: u64) -> Self {
        Self::new(PaxKeyword::Size, size.to_string())
    }
    /// Full path, for paths the `prefix`/`name` pair cannot hold.
    pub fn path<V: Into<String>>(path: V) -> Self {
        Self::new(PaxKeyword::Path, path)
    }
    pub fn keyword(&self) -> PaxKeyword {
        self.keyword
    }
    pub fn value(&self) -> &str {
        &self.value
    }
    /// Length of the encoded record in bytes.
    pub fn record_len(&self) -> usize {
        pax_record_len(self.keyword.as_str(), self.value.len())
    }
    /// Append the encoded record to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let len = self.record_len();
        out.reserve(len);
        out.extend_from_slice(len.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.keyword.as_str().as_bytes());
        out.push(b'=');
        out.extend_from_slice(self.value.as_bytes());
        out.push(b'\n');
    }
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }
}

/// Concatenate the encoded records, in order.
pub fn encode_records(records: &[PaxExtendedHeader]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.iter().map(|r| r.record_len()).sum());
    for record in records {
        record.write_to(&mut out);
    }
    out
}

fn pax_record_len(key: &str, val_len: usize) -> usize {
    // <LEN> SP <KEY>=<VALUE>\n
    let payload_len = key.len() + 1 + val_len + 1;
    let mut len = payload_len + 1 + 1;
    loop {
        let d = num_decimal_digits(len);
        let new_len = payload_len + 1 + d;

        if new_len == len {
            return len;
        }
        len = new_len;
    }
}

#[inline]
fn num_decimal_digits(mut n: usize) -> usize {
    let mut c = 1;
    while n >= 10 {
        n /= 10;
        c += 1;
    }
    c
}
