//! Response parsing.
//!
//! The store separates fields with spaces and terminates lines with CRLF,
//! but neither carries information: every field is fixed width. Callers
//! feed received bytes through [`append_stripped`] and parse the compacted
//! stream with [`Response::parse`].

use crate::ParseError;
use crate::entry::{CraqEntry, ENTRY_VALUE_LEN};
use crate::key::{DATA_KEY_LEN, DataKey};

const STORED: &[u8] = b"STORED";
const NOT_FOUND: &[u8] = b"NOT_FOUND";
const ERROR: &[u8] = b"ERROR";
const VALUE: &[u8] = b"VALUE";

/// Width of the length field that follows a VALUE key.
const VALUE_LEN_DIGITS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Stored,
    NotFound,
    Error,
    Value,
}

// No tag is a prefix of another, so at most one can match at offset 0.
const TAGS: [(&[u8], Tag); 4] = [
    (STORED, Tag::Stored),
    (NOT_FOUND, Tag::NotFound),
    (ERROR, Tag::Error),
    (VALUE, Tag::Value),
];

/// Append `src` to `dst` with all ASCII whitespace removed.
pub fn append_stripped<B: Extend<u8>>(dst: &mut B, src: &[u8]) {
    dst.extend(src.iter().copied().filter(|b| !b.is_ascii_whitespace()));
}

/// A response from the location store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response {
    /// A SET for `key` was applied.
    Stored { key: DataKey },
    /// A GET for `key` found no record.
    NotFound { key: DataKey },
    /// The store rejected the oldest request for `key`.
    Error { key: DataKey },
    /// A GET for `key` returned a record.
    Value { key: DataKey, entry: CraqEntry },
}

impl Response {
    pub fn key(&self) -> &DataKey {
        match self {
            Response::Stored { key }
            | Response::NotFound { key }
            | Response::Error { key }
            | Response::Value { key, .. } => key,
        }
    }

    /// Parse one response from the front of a whitespace-stripped buffer.
    ///
    /// Returns the parsed response and number of bytes consumed. Bytes that
    /// precede a tag, or a buffer that can never grow into a tag, are
    /// [`ParseError::Invalid`]; a buffer that is a strict prefix of a valid
    /// response is [`ParseError::Incomplete`].
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        if data.is_empty() {
            return Err(ParseError::Incomplete);
        }

        let Some((tag_bytes, tag)) = TAGS.iter().find(|(t, _)| data.starts_with(t)) else {
            if TAGS
                .iter()
                .any(|(t, _)| data.len() < t.len() && t.starts_with(data))
            {
                return Err(ParseError::Incomplete);
            }
            return Err(ParseError::Invalid("unrecognized tag"));
        };

        let mut pos = tag_bytes.len();
        let key = parse_key(&data[pos..])?;
        pos += DATA_KEY_LEN;

        let response = match tag {
            Tag::Stored => Response::Stored { key },
            Tag::NotFound => Response::NotFound { key },
            Tag::Error => Response::Error { key },
            Tag::Value => {
                let rest = &data[pos..];
                if rest.len() < VALUE_LEN_DIGITS {
                    return Err(ParseError::Incomplete);
                }
                let digits = &rest[..VALUE_LEN_DIGITS];
                if !digits.iter().all(u8::is_ascii_digit) {
                    return Err(ParseError::Invalid("value length"));
                }
                let len = ((digits[0] - b'0') * 10 + (digits[1] - b'0')) as usize;
                if len != ENTRY_VALUE_LEN {
                    return Err(ParseError::Invalid("unexpected value length"));
                }
                pos += VALUE_LEN_DIGITS;

                let rest = &data[pos..];
                if rest.len() < len {
                    return Err(ParseError::Incomplete);
                }
                let entry = CraqEntry::from_value(&rest[..len])
                    .ok_or(ParseError::Invalid("malformed value"))?;
                pos += len;
                Response::Value { key, entry }
            }
        };

        Ok((response, pos))
    }

    /// Returns the length of this response in the store's own framing.
    pub const fn encoded_len(&self) -> usize {
        let line = match self {
            Response::Stored { .. } => STORED.len(),
            Response::NotFound { .. } => NOT_FOUND.len(),
            Response::Error { .. } => ERROR.len(),
            Response::Value { .. } => VALUE.len() + 1 + VALUE_LEN_DIGITS,
        } + 1
            + DATA_KEY_LEN
            + 2;
        match self {
            Response::Value { .. } => line + ENTRY_VALUE_LEN + 2,
            _ => line,
        }
    }

    /// Encode this response the way the store frames it, with separating
    /// spaces and CRLF line endings.
    ///
    /// Returns the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let tag = match self {
            Response::Stored { .. } => STORED,
            Response::NotFound { .. } => NOT_FOUND,
            Response::Error { .. } => ERROR,
            Response::Value { .. } => VALUE,
        };
        let mut pos = put(buf, 0, tag);
        pos = put(buf, pos, b" ");
        pos = put(buf, pos, self.key().as_bytes());
        if let Response::Value { entry, .. } = self {
            pos = put(buf, pos, b" ");
            let len = [
                b'0' + (ENTRY_VALUE_LEN / 10) as u8,
                b'0' + (ENTRY_VALUE_LEN % 10) as u8,
            ];
            pos = put(buf, pos, &len);
            pos = put(buf, pos, b"\r\n");
            pos = put(buf, pos, &entry.to_value());
        }
        put(buf, pos, b"\r\n")
    }
}

fn parse_key(data: &[u8]) -> Result<DataKey, ParseError> {
    if data.len() < DATA_KEY_LEN {
        // a short key is only incomplete if what we have could still be one
        return match DataKey::from_slice(&padded_key(data)) {
            Some(_) => Err(ParseError::Incomplete),
            None => Err(ParseError::Invalid("malformed key")),
        };
    }
    DataKey::from_slice(&data[..DATA_KEY_LEN]).ok_or(ParseError::Invalid("malformed key"))
}

// Complete a partial key with hex digits so its prefix can be validated.
fn padded_key(partial: &[u8]) -> [u8; DATA_KEY_LEN] {
    let mut key = [b'0'; DATA_KEY_LEN];
    key[..partial.len()].copy_from_slice(partial);
    key
}

fn put(buf: &mut [u8], pos: usize, bytes: &[u8]) -> usize {
    buf[pos..pos + bytes.len()].copy_from_slice(bytes);
    pos + bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ObjectId;

    fn key(n: u128) -> DataKey {
        DataKey::new(b'o', &ObjectId::from_u128(n))
    }

    fn stripped(response: &Response) -> Vec<u8> {
        let mut framed = [0u8; 128];
        let len = response.encode(&mut framed);
        assert_eq!(len, response.encoded_len());
        let mut out = Vec::new();
        append_stripped(&mut out, &framed[..len]);
        out
    }

    #[test]
    fn test_encode_framing() {
        let mut buf = [0u8; 128];
        let len = Response::Stored { key: key(1) }.encode(&mut buf);
        assert_eq!(&buf[..len], b"STORED o00000000000000000000000000000001\r\n");

        let value = Response::Value {
            key: key(1),
            entry: CraqEntry::new(0x864f_d26f, f32::from_bits(0xb559_f75b)),
        };
        let len = value.encode(&mut buf);
        assert_eq!(
            &buf[..len],
            b"VALUE o00000000000000000000000000000001 12\r\nHelloWorldYY\r\n"
        );
    }

    #[test]
    fn test_parse_each_tag() {
        let responses = [
            Response::Stored { key: key(1) },
            Response::NotFound { key: key(2) },
            Response::Error { key: key(3) },
            Response::Value {
                key: key(4),
                entry: CraqEntry::new(11, 2.5),
            },
        ];
        for response in responses {
            let data = stripped(&response);
            assert_eq!(Response::parse(&data), Ok((response, data.len())));
        }
    }

    #[test]
    fn test_parse_consumes_one_response() {
        let mut data = stripped(&Response::Stored { key: key(1) });
        let first = data.len();
        data.extend(stripped(&Response::NotFound { key: key(1) }));

        let (response, consumed) = Response::parse(&data).unwrap();
        assert_eq!(response, Response::Stored { key: key(1) });
        assert_eq!(consumed, first);

        let (response, consumed) = Response::parse(&data[first..]).unwrap();
        assert_eq!(response, Response::NotFound { key: key(1) });
        assert_eq!(first + consumed, data.len());
    }

    #[test]
    fn test_parse_incomplete_at_every_split() {
        let data = stripped(&Response::Value {
            key: key(9),
            entry: CraqEntry::new(3, 4.0),
        });
        for end in 0..data.len() {
            assert_eq!(
                Response::parse(&data[..end]),
                Err(ParseError::Incomplete),
                "prefix of length {end}"
            );
        }
    }

    #[test]
    fn test_parse_leading_junk_is_invalid() {
        let mut data = b"xx".to_vec();
        data.extend(stripped(&Response::Stored { key: key(1) }));
        assert!(matches!(
            Response::parse(&data),
            Err(ParseError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            Response::parse(b"HELLO"),
            Err(ParseError::Invalid(_))
        ));
        assert!(matches!(
            Response::parse(b"STOREX"),
            Err(ParseError::Invalid(_))
        ));
        assert_eq!(Response::parse(b"NOT_F"), Err(ParseError::Incomplete));
    }

    #[test]
    fn test_parse_malformed_key() {
        assert!(matches!(
            Response::parse(b"STOREDoZZ"),
            Err(ParseError::Invalid("malformed key"))
        ));
        assert_eq!(Response::parse(b"STOREDo00ab"), Err(ParseError::Incomplete));
    }

    #[test]
    fn test_parse_bad_value() {
        let k = key(5);
        let mut data = b"VALUE".to_vec();
        data.extend_from_slice(k.as_bytes());
        data.extend_from_slice(b"12HelloWorldXX");
        assert!(matches!(
            Response::parse(&data),
            Err(ParseError::Invalid("malformed value"))
        ));

        let mut data = b"VALUE".to_vec();
        data.extend_from_slice(k.as_bytes());
        data.extend_from_slice(b"05abcde");
        assert!(matches!(
            Response::parse(&data),
            Err(ParseError::Invalid("unexpected value length"))
        ));

        let mut data = b"VALUE".to_vec();
        data.extend_from_slice(k.as_bytes());
        data.extend_from_slice(b"1x");
        assert!(matches!(
            Response::parse(&data),
            Err(ParseError::Invalid("value length"))
        ));
    }

    #[test]
    fn test_append_stripped() {
        let mut out = Vec::new();
        append_stripped(&mut out, b" A\tB\r\nC ");
        assert_eq!(out, b"ABC");
    }
}
