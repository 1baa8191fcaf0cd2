//! The location record and its 10 character text token.
//!
//! A record is 8 bytes on the wire: the server id as a big-endian `u32`
//! followed by the IEEE-754 bits of the radius as a big-endian `u32`. The
//! bytes are rendered with Z85 (two 5 character groups, one per 4 byte
//! word), which keeps the token printable and free of whitespace so it
//! survives the whitespace stripping on the response path.

use crate::key::{NULL_SERVER_ID, ServerId};

/// Length of the text token.
pub const ENTRY_TOKEN_LEN: usize = 10;

/// Terminator appended to the token in stored values.
pub const VALUE_TERMINATOR: &[u8; 2] = b"YY";

/// Length of a stored value: token plus terminator.
pub const ENTRY_VALUE_LEN: usize = ENTRY_TOKEN_LEN + VALUE_TERMINATOR.len();

const Z85_ALPHABET: &[u8; 85] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ.-:+=^!/*?&<>()[]{}@%$#";

// Bytes outside the alphabet decode as digit 0.
const Z85_DECODE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < Z85_ALPHABET.len() {
        table[Z85_ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Where an object lives and how large it is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CraqEntry {
    server: ServerId,
    radius: f32,
}

impl CraqEntry {
    pub const fn new(server: ServerId, radius: f32) -> Self {
        Self { server, radius }
    }

    /// The sentinel meaning "location unknown".
    pub const fn null() -> Self {
        Self {
            server: NULL_SERVER_ID,
            radius: 0.0,
        }
    }

    pub const fn is_null(&self) -> bool {
        self.server == NULL_SERVER_ID
    }

    pub const fn server(&self) -> ServerId {
        self.server
    }

    pub const fn radius(&self) -> f32 {
        self.radius
    }

    /// Encode the record as its 10 character token.
    pub fn serialize(&self) -> [u8; ENTRY_TOKEN_LEN] {
        let words = [self.server, self.radius.to_bits()];
        let mut out = [0u8; ENTRY_TOKEN_LEN];
        for (word, group) in words.iter().zip(out.chunks_exact_mut(5)) {
            let mut value = *word;
            for slot in group.iter_mut().rev() {
                *slot = Z85_ALPHABET[(value % 85) as usize];
                value /= 85;
            }
        }
        out
    }

    /// Decode a token.
    ///
    /// Decoding is total: any 10 bytes produce a record. Tokens produced by
    /// [`serialize`](Self::serialize) decode to the identical record.
    pub fn deserialize(token: &[u8; ENTRY_TOKEN_LEN]) -> Self {
        let mut words = [0u32; 2];
        for (word, group) in words.iter_mut().zip(token.chunks_exact(5)) {
            *word = group.iter().fold(0u32, |acc, &c| {
                acc.wrapping_mul(85)
                    .wrapping_add(Z85_DECODE[c as usize] as u32)
            });
        }
        Self {
            server: words[0],
            radius: f32::from_bits(words[1]),
        }
    }

    /// The value stored for this record: the token followed by `YY`.
    pub fn to_value(&self) -> [u8; ENTRY_VALUE_LEN] {
        let mut value = [0u8; ENTRY_VALUE_LEN];
        value[..ENTRY_TOKEN_LEN].copy_from_slice(&self.serialize());
        value[ENTRY_TOKEN_LEN..].copy_from_slice(VALUE_TERMINATOR);
        value
    }

    /// Decode a stored value, which must be a token followed by `YY`.
    pub fn from_value(value: &[u8]) -> Option<Self> {
        if value.len() != ENTRY_VALUE_LEN || !value.ends_with(VALUE_TERMINATOR) {
            return None;
        }
        let mut token = [0u8; ENTRY_TOKEN_LEN];
        token.copy_from_slice(&value[..ENTRY_TOKEN_LEN]);
        Some(Self::deserialize(&token))
    }
}

impl Default for CraqEntry {
    fn default() -> Self {
        Self::null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_same(a: CraqEntry, b: CraqEntry) {
        assert_eq!(a.server(), b.server());
        assert_eq!(a.radius().to_bits(), b.radius().to_bits());
    }

    #[test]
    fn test_null() {
        let null = CraqEntry::null();
        assert!(null.is_null());
        assert_eq!(null.radius(), 0.0);
        assert!(!CraqEntry::new(1, 0.0).is_null());
        assert_same(CraqEntry::deserialize(&null.serialize()), null);
    }

    #[test]
    fn test_token_alphabet() {
        let token = CraqEntry::new(u32::MAX, f32::MAX).serialize();
        assert!(token.iter().all(|c| Z85_ALPHABET.contains(c)));
        assert!(!token.iter().any(|c| c.is_ascii_whitespace()));
    }

    #[test]
    fn test_known_token() {
        // reference vector from the Z85 specification
        let entry = CraqEntry::new(0x864f_d26f, f32::from_bits(0xb559_f75b));
        assert_eq!(&entry.serialize(), b"HelloWorld");
        assert_same(CraqEntry::deserialize(b"HelloWorld"), entry);
    }

    #[test]
    fn test_roundtrip_edges() {
        let servers = [0, 1, 2, 0x7fff_ffff, 0x8000_0000, u32::MAX];
        let radii = [
            0.0,
            -0.0,
            1.0,
            -1.5,
            f32::MIN_POSITIVE,
            f32::from_bits(1),
            f32::MAX,
            f32::MIN,
            f32::INFINITY,
            f32::NEG_INFINITY,
        ];
        for &server in &servers {
            for &radius in &radii {
                let entry = CraqEntry::new(server, radius);
                assert_same(CraqEntry::deserialize(&entry.serialize()), entry);
            }
        }
    }

    #[test]
    fn test_roundtrip_nan_bits() {
        let entry = CraqEntry::new(9, f32::from_bits(0x7fc0_1234));
        let decoded = CraqEntry::deserialize(&entry.serialize());
        assert_eq!(decoded.radius().to_bits(), 0x7fc0_1234);
    }

    #[test]
    fn test_roundtrip_sweep() {
        // xorshift over the full 64-bit record space
        let mut state = 0x9e37_79b9_7f4a_7c15u64;
        for _ in 0..10_000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let entry = CraqEntry::new((state >> 32) as u32, f32::from_bits(state as u32));
            assert_same(CraqEntry::deserialize(&entry.serialize()), entry);
        }
    }

    #[test]
    fn test_deserialize_is_total() {
        // bytes outside the alphabet never panic
        let _ = CraqEntry::deserialize(b"\0\0\0\0\0\xff\xff\xff\xff\xff");
        let _ = CraqEntry::deserialize(b"##########");
    }

    #[test]
    fn test_value() {
        let entry = CraqEntry::new(12, 3.25);
        let value = entry.to_value();
        assert_eq!(&value[ENTRY_TOKEN_LEN..], b"YY");
        assert_same(CraqEntry::from_value(&value).unwrap(), entry);

        assert!(CraqEntry::from_value(&value[..11]).is_none());
        let mut bad = value;
        bad[11] = b'Z';
        assert!(CraqEntry::from_value(&bad).is_none());
    }
}
