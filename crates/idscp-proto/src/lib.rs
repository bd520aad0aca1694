//! Wire messages for the IDSCP2 protocol.
//!
//! Every protocol message is a variant of [`IdscpMessage`], encoded as a
//! single CBOR item. The secure channel underneath is responsible for
//! framing; this crate only turns one frame into one message and back.
//!
//! # Security
//!
//! Inbound frames come straight from the network. We enforce a 16 MB limit
//! before handing anything to the CBOR decoder, and a frame that fails to
//! decode is reported as [`ProtocolError::Decode`] rather than panicking.
//! Token bytes never show up in `Debug` output.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod errors;
pub mod message;

pub use codec::{MAX_MESSAGE_SIZE, decode, encode};
pub use errors::{ProtocolError, Result};
pub use message::{
    CloseCause, IdscpAck, IdscpClose, IdscpDat, IdscpData, IdscpHello, IdscpMessage,
    IdscpRatProver, IdscpRatVerifier, IdscpReRat, MessageKind, PROTOCOL_VERSION,
};
