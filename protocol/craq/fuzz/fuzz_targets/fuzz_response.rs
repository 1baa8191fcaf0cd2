#![no_main]

use libfuzzer_sys::fuzz_target;
use protocol_craq::{Response, append_stripped};

fuzz_target!(|data: &[u8]| {
    let mut buf = Vec::with_capacity(data.len());
    append_stripped(&mut buf, data);

    // Drain the buffer the way a connection does
    let mut pos = 0;
    while pos < buf.len() {
        match Response::parse(&buf[pos..]) {
            Ok((response, consumed)) => {
                assert!(consumed > 0);
                assert!(pos + consumed <= buf.len());

                // Re-encoding yields a response for the same key
                let mut framed = [0u8; 128];
                let len = response.encode(&mut framed);
                assert_eq!(len, response.encoded_len());
                let mut again = Vec::new();
                append_stripped(&mut again, &framed[..len]);
                let (reparsed, _) = Response::parse(&again).expect("re-encoded response parses");
                assert_eq!(reparsed.key(), response.key());

                pos += consumed;
            }
            Err(_) => break,
        }
    }
});
