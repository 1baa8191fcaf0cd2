//! Object identifiers and the fixed width store keys derived from them.

use std::fmt;
use std::str::FromStr;

/// Identifier of a space server.
pub type ServerId = u32;

/// The server id carried by a null location record.
pub const NULL_SERVER_ID: ServerId = 0;

/// Length of an encoded [`DataKey`]: one prefix byte plus 32 hex digits.
pub const DATA_KEY_LEN: usize = 33;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// A 128-bit object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId([u8; 16]);

impl ObjectId {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub const fn as_u128(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }

    /// Write the 32 lowercase hex digits of this id into `out`.
    fn write_hex(&self, out: &mut [u8; 32]) {
        for (i, byte) in self.0.iter().enumerate() {
            out[2 * i] = HEX[(byte >> 4) as usize];
            out[2 * i + 1] = HEX[(byte & 0x0f) as usize];
        }
    }

    fn from_hex(hex: &[u8]) -> Option<Self> {
        if hex.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, pair) in hex.chunks_exact(2).enumerate() {
            bytes[i] = (hex_value(pair[0])? << 4) | hex_value(pair[1])?;
        }
        Some(Self(bytes))
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hex = [0u8; 32];
        self.write_hex(&mut hex);
        // hex digits are always ASCII
        f.write_str(std::str::from_utf8(&hex).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

/// Error returned when a string is not a 32 digit hex object id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid object id: {0:?}")]
pub struct InvalidObjectId(pub String);

impl FromStr for ObjectId {
    type Err = InvalidObjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s.as_bytes()).ok_or_else(|| InvalidObjectId(s.to_string()))
    }
}

/// The key an object's location record is stored under.
///
/// A single prefix byte namespaces the keys of one deployment, followed by
/// the object id as 32 lowercase hex digits. Every key is exactly
/// [`DATA_KEY_LEN`] bytes so the response parser never needs a delimiter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataKey([u8; DATA_KEY_LEN]);

impl DataKey {
    pub fn new(prefix: u8, id: &ObjectId) -> Self {
        let mut key = [0u8; DATA_KEY_LEN];
        key[0] = prefix;
        let mut hex = [0u8; 32];
        id.write_hex(&mut hex);
        key[1..].copy_from_slice(&hex);
        Self(key)
    }

    /// Accept exactly [`DATA_KEY_LEN`] bytes of a printable prefix and
    /// lowercase hex digits, as the store echoes them back.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != DATA_KEY_LEN || !bytes[0].is_ascii_graphic() {
            return None;
        }
        if !bytes[1..]
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
        {
            return None;
        }
        let mut key = [0u8; DATA_KEY_LEN];
        key.copy_from_slice(bytes);
        Some(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn prefix(&self) -> u8 {
        self.0[0]
    }

    /// Recover the object id this key was built from.
    pub fn object_id(&self) -> ObjectId {
        // construction guarantees 32 hex digits after the prefix
        ObjectId::from_hex(&self.0[1..]).unwrap_or_default()
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataKey({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_hex() {
        let id = ObjectId::from_u128(0x0123_4567_89ab_cdef_0011_2233_4455_6677);
        assert_eq!(id.to_string(), "0123456789abcdef0011223344556677");
        assert_eq!(id.to_string().parse::<ObjectId>().unwrap(), id);
    }

    #[test]
    fn test_object_id_parse_rejects_bad_input() {
        assert!("abc".parse::<ObjectId>().is_err());
        assert!(
            "0123456789abcdef001122334455667g"
                .parse::<ObjectId>()
                .is_err()
        );
        // uppercase is accepted on input
        let id: ObjectId = "0123456789ABCDEF0011223344556677".parse().unwrap();
        assert_eq!(id.to_string(), "0123456789abcdef0011223344556677");
    }

    #[test]
    fn test_data_key_layout() {
        let key = DataKey::new(b'o', &ObjectId::from_u128(0x42));
        assert_eq!(key.as_bytes().len(), DATA_KEY_LEN);
        assert_eq!(key.prefix(), b'o');
        assert_eq!(key.as_bytes(), b"o00000000000000000000000000000042");
        assert_eq!(key.object_id(), ObjectId::from_u128(0x42));
    }

    #[test]
    fn test_data_key_from_slice() {
        let key = DataKey::new(b'x', &ObjectId::from_u128(u128::MAX));
        assert_eq!(DataKey::from_slice(key.as_bytes()), Some(key));
        assert_eq!(DataKey::from_slice(&key.as_bytes()[..32]), None);
        assert_eq!(DataKey::from_slice(b" 0000000000000000000000000000000a"), None);
        assert_eq!(DataKey::from_slice(b"o0000000000000000000000000000000Z"), None);
    }
}
