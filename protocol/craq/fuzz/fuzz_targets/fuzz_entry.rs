#![no_main]

use libfuzzer_sys::fuzz_target;
use protocol_craq::{CraqEntry, ENTRY_TOKEN_LEN};

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    // Any record survives a round trip through its token
    let server = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let bits = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let entry = CraqEntry::new(server, f32::from_bits(bits));
    let decoded = CraqEntry::deserialize(&entry.serialize());
    assert_eq!(decoded.server(), server);
    assert_eq!(decoded.radius().to_bits(), bits);

    // Any token decodes without panicking
    if data.len() >= 8 + ENTRY_TOKEN_LEN {
        let mut token = [0u8; ENTRY_TOKEN_LEN];
        token.copy_from_slice(&data[8..8 + ENTRY_TOKEN_LEN]);
        let _ = CraqEntry::deserialize(&token);
    }
});
