//! CBOR encoding of protocol messages.

use crate::{
    errors::{ProtocolError, Result},
    message::IdscpMessage,
};

/// Maximum encoded message size (16 MB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Encode a message into a single CBOR item.
pub fn encode(message: &IdscpMessage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(message, &mut buf).map_err(|e| ProtocolError::Encode(e.to_string()))?;

    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: buf.len(), max: MAX_MESSAGE_SIZE });
    }

    Ok(buf)
}

/// Decode one message from a received frame.
///
/// The size limit is checked before the decoder sees any byte.
pub fn decode(bytes: &[u8]) -> Result<IdscpMessage> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: bytes.len(), max: MAX_MESSAGE_SIZE });
    }

    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::message::{CloseCause, IdscpDat, IdscpHello};

    #[test]
    fn hello_survives_encoding() {
        let hello = IdscpMessage::Hello(IdscpHello {
            version: crate::PROTOCOL_VERSION,
            dynamic_attribute_token: Some(IdscpDat { token: b"token".to_vec() }),
            supported_rat_suite: vec!["TPM2".to_string(), "Dummy".to_string()],
            expected_rat_suite: vec!["Dummy".to_string()],
        });

        let bytes = encode(&hello).unwrap();
        assert_eq!(decode(&bytes).unwrap(), hello);
    }

    #[test]
    fn close_cause_is_encoded_as_integer() {
        let close = IdscpMessage::close(CloseCause::NoValidDat, "bad token");
        let bytes = encode(&close).unwrap();

        let value: ciborium::Value = ciborium::from_reader(bytes.as_slice()).unwrap();
        let rendered = format!("{value:?}");
        assert!(rendered.contains("Integer"));
        assert!(!rendered.contains("NoValidDat"));
    }

    #[test]
    fn garbage_is_rejected() {
        let result = decode(&[0xff, 0x00, 0x13, 0x37]);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn oversized_frame_is_rejected_before_decoding() {
        let bytes = vec![0u8; MAX_MESSAGE_SIZE + 1];
        let result = decode(&bytes);
        assert!(matches!(result, Err(ProtocolError::MessageTooLarge { .. })));
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
            let _ = decode(&bytes);
        }

        #[test]
        fn data_keeps_payload_and_bit(
            data in prop::collection::vec(any::<u8>(), 0..256),
            bit in any::<bool>(),
        ) {
            let message = IdscpMessage::data(data, bit);
            let bytes = encode(&message).unwrap();
            prop_assert_eq!(decode(&bytes).unwrap(), message);
        }
    }
}
