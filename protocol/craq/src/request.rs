//! Client-side request encoding.

use crate::entry::{CraqEntry, ENTRY_VALUE_LEN};
use crate::key::{DATA_KEY_LEN, DataKey};

/// Encoded length of a GET: `get <key>\r\n`.
const GET_LEN: usize = 4 + DATA_KEY_LEN + 2;

/// Encoded length of a SET: `set <key> 12\r\n<value>\r\n`.
const SET_LEN: usize = 4 + DATA_KEY_LEN + 1 + 2 + 2 + ENTRY_VALUE_LEN + 2;

/// A request to the location store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Request<'a> {
    /// `get <key>\r\n`
    Get { key: &'a DataKey },
    /// `set <key> 12\r\n<token>YY\r\n`
    Set { key: &'a DataKey, entry: CraqEntry },
}

impl<'a> Request<'a> {
    #[inline]
    pub fn get(key: &'a DataKey) -> Self {
        Request::Get { key }
    }

    #[inline]
    pub fn set(key: &'a DataKey, entry: CraqEntry) -> Self {
        Request::Set { key, entry }
    }

    pub fn key(&self) -> &DataKey {
        match self {
            Request::Get { key } | Request::Set { key, .. } => key,
        }
    }

    /// Returns the encoded length of this request.
    pub const fn encoded_len(&self) -> usize {
        match self {
            Request::Get { .. } => GET_LEN,
            Request::Set { .. } => SET_LEN,
        }
    }

    /// Encode this request into a buffer.
    ///
    /// Returns the number of bytes written. The buffer must hold at least
    /// [`encoded_len`](Self::encoded_len) bytes.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        match self {
            Request::Get { key } => {
                let mut pos = put(buf, 0, b"get ");
                pos = put(buf, pos, key.as_bytes());
                put(buf, pos, b"\r\n")
            }
            Request::Set { key, entry } => {
                let mut pos = put(buf, 0, b"set ");
                pos = put(buf, pos, key.as_bytes());
                pos = put(buf, pos, b" ");
                pos = put_decimal(buf, pos, ENTRY_VALUE_LEN);
                pos = put(buf, pos, b"\r\n");
                pos = put(buf, pos, &entry.to_value());
                put(buf, pos, b"\r\n")
            }
        }
    }
}

fn put(buf: &mut [u8], pos: usize, bytes: &[u8]) -> usize {
    buf[pos..pos + bytes.len()].copy_from_slice(bytes);
    pos + bytes.len()
}

fn put_decimal(buf: &mut [u8], pos: usize, mut value: usize) -> usize {
    let mut digits = [0u8; 20];
    let mut n = 0;
    loop {
        digits[n] = b'0' + (value % 10) as u8;
        n += 1;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    for (i, d) in digits[..n].iter().rev().enumerate() {
        buf[pos + i] = *d;
    }
    pos + n
}
