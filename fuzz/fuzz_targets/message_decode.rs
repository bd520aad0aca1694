//! Arbitrary bytes must never panic the decoder, and anything it accepts
//! must survive a re-encode.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = idscp_proto::decode(data) {
        let encoded = idscp_proto::encode(&message).expect("decoded message re-encodes");
        let again = idscp_proto::decode(&encoded).expect("re-encoded message decodes");
        assert_eq!(message, again);
    }
});
