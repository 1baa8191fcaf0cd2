//! Wire codec for the CRAQ object location store.
//!
//! The store holds one small record per object: the server currently
//! hosting it and the object's radius. Records are addressed by a fixed
//! width [`DataKey`] and carried as a 10 character Z85 token followed by a
//! two byte `YY` terminator.
//!
//! Requests use a memcache-like ASCII framing:
//! - `get <key>\r\n`
//! - `set <key> 12\r\n<token>YY\r\n`
//!
//! Responses are parsed with all ASCII whitespace removed, so the parser
//! only sees the tag, the key, and (for values) the length and payload:
//! - `STORED<key>`
//! - `NOT_FOUND<key>`
//! - `ERROR<key>`
//! - `VALUE<key><len><token>YY`
//!
//! # Example
//!
//! ```
//! use protocol_craq::{CraqEntry, DataKey, ObjectId, Request, Response, append_stripped};
//!
//! let key = DataKey::new(b'o', &ObjectId::from_u128(0x42));
//! let entry = CraqEntry::new(7, 1.5);
//!
//! let mut buf = [0u8; 64];
//! let len = Request::set(&key, entry).encode(&mut buf);
//! assert!(buf[..len].starts_with(b"set o0000"));
//!
//! // the store's framing, as received off the socket
//! let mut framed = [0u8; 128];
//! let len = Response::Value { key, entry }.encode(&mut framed);
//!
//! let mut wire = Vec::new();
//! append_stripped(&mut wire, &framed[..len]);
//! let (response, consumed) = Response::parse(&wire).unwrap();
//! assert_eq!(consumed, wire.len());
//! assert_eq!(response, Response::Value { key, entry });
//! ```

mod entry;
mod key;
mod request;
mod response;

pub use entry::{CraqEntry, ENTRY_TOKEN_LEN, ENTRY_VALUE_LEN, VALUE_TERMINATOR};
pub use key::{DATA_KEY_LEN, DataKey, InvalidObjectId, NULL_SERVER_ID, ObjectId, ServerId};
pub use request::Request;
pub use response::{Response, append_stripped};

/// Parse error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Need more data to complete parsing.
    #[error("incomplete")]
    Incomplete,
    /// The buffer cannot be the start of any valid response.
    #[error("invalid response: {0}")]
    Invalid(&'static str),
}
