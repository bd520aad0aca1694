//! Protocol message types.
//!
//! # Protocol Flow
//!
//! ```text
//! Peer A                                   Peer B
//!   │── Hello(dat, provers, verifiers) ────>│
//!   │<──── Hello(dat, provers, verifiers) ──│
//!   │<═══════ RatProver / RatVerifier ═════>│   (both directions, concurrently)
//!   │── Data(bit) ─────────────────────────>│
//!   │<───────────────────────────── Ack(bit)│
//!   │── DatExpired ────────────────────────>│   (token refresh)
//!   │<───────────────────────────────── Dat │
//!   │── ReRat ─────────────────────────────>│   (re-attestation)
//!   │── Close(cause, reason) ──────────────>│
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Protocol version carried in every Hello.
pub const PROTOCOL_VERSION: u16 = 2;

/// A single IDSCP2 protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdscpMessage {
    /// Handshake opener, carries the local token and attestation suites
    Hello(IdscpHello),
    /// Session termination with cause
    Close(IdscpClose),
    /// Fresh dynamic attribute token
    Dat(IdscpDat),
    /// The peer's token expired, a fresh one is requested
    DatExpired,
    /// Opaque message from the sender's prover driver
    RatProver(IdscpRatProver),
    /// Opaque message from the sender's verifier driver
    RatVerifier(IdscpRatVerifier),
    /// Request to repeat attestation
    ReRat(IdscpReRat),
    /// Application payload tagged with an alternating bit
    Data(IdscpData),
    /// Acknowledgement of a Data message
    Ack(IdscpAck),
}

impl IdscpMessage {
    /// Discriminant of this message, used as a transition key.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Hello(_) => MessageKind::Hello,
            Self::Close(_) => MessageKind::Close,
            Self::Dat(_) => MessageKind::Dat,
            Self::DatExpired => MessageKind::DatExpired,
            Self::RatProver(_) => MessageKind::RatProver,
            Self::RatVerifier(_) => MessageKind::RatVerifier,
            Self::ReRat(_) => MessageKind::ReRat,
            Self::Data(_) => MessageKind::Data,
            Self::Ack(_) => MessageKind::Ack,
        }
    }

    /// Build a Close message.
    pub fn close(cause: CloseCause, reason: impl Into<String>) -> Self {
        Self::Close(IdscpClose { cause, reason: reason.into() })
    }

    /// Build a Dat message.
    pub fn dat(token: Vec<u8>) -> Self {
        Self::Dat(IdscpDat { token })
    }

    /// Build a ReRat message.
    pub fn re_rat(cause: impl Into<String>) -> Self {
        Self::ReRat(IdscpReRat { cause: cause.into() })
    }

    /// Build a Data message.
    pub fn data(data: Vec<u8>, alternating_bit: bool) -> Self {
        Self::Data(IdscpData { data, alternating_bit })
    }

    /// Build an Ack message.
    pub fn ack(alternating_bit: bool) -> Self {
        Self::Ack(IdscpAck { alternating_bit })
    }
}

/// Message discriminant without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// [`IdscpMessage::Hello`]
    Hello,
    /// [`IdscpMessage::Close`]
    Close,
    /// [`IdscpMessage::Dat`]
    Dat,
    /// [`IdscpMessage::DatExpired`]
    DatExpired,
    /// [`IdscpMessage::RatProver`]
    RatProver,
    /// [`IdscpMessage::RatVerifier`]
    RatVerifier,
    /// [`IdscpMessage::ReRat`]
    ReRat,
    /// [`IdscpMessage::Data`]
    Data,
    /// [`IdscpMessage::Ack`]
    Ack,
}

impl MessageKind {
    /// Every message kind, in wire declaration order.
    pub const ALL: [Self; 9] = [
        Self::Hello,
        Self::Close,
        Self::Dat,
        Self::DatExpired,
        Self::RatProver,
        Self::RatVerifier,
        Self::ReRat,
        Self::Data,
        Self::Ack,
    ];
}

/// Handshake opener.
///
/// # Protocol Flow
///
/// Both peers send a Hello as soon as their handshake is started. Attestation
/// mechanisms are negotiated from the two suites: the sender's provers are
/// matched against the receiver's expected verifiers and vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdscpHello {
    /// Protocol version of the sender
    pub version: u16,

    /// Sender's dynamic attribute token, mandatory for a valid handshake
    pub dynamic_attribute_token: Option<IdscpDat>,

    /// Attestation prover mechanisms the sender supports
    pub supported_rat_suite: Vec<String>,

    /// Attestation verifier mechanisms the sender expects the peer to satisfy
    pub expected_rat_suite: Vec<String>,
}

/// Session termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdscpClose {
    /// Why the session is closed
    pub cause: CloseCause,

    /// Human readable reason
    pub reason: String,
}

/// Close cause codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum CloseCause {
    /// Closed by the local user
    UserShutdown = 0,
    /// Handshake or attestation took too long
    Timeout = 1,
    /// Internal or transport error
    Error = 2,
    /// Peer token missing or rejected
    NoValidDat = 3,
    /// No prover mechanism matches the peer's expected verifiers
    NoRatMechanismMatchProver = 4,
    /// No verifier mechanism matches the peer's supported provers
    NoRatMechanismMatchVerifier = 5,
    /// Local prover failed or could not be started
    RatProverFailed = 6,
    /// Local verifier rejected the peer or could not be started
    RatVerifierFailed = 7,
}

/// Dynamic attribute token.
///
/// Token contents are credentials and are redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdscpDat {
    /// Opaque token bytes issued by the token service
    #[serde(with = "serde_bytes")]
    pub token: Vec<u8>,
}

impl fmt::Debug for IdscpDat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdscpDat")
            .field("token", &format_args!("<{} bytes>", self.token.len()))
            .finish()
    }
}

/// Prover driver message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdscpRatProver {
    /// Opaque driver payload
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Verifier driver message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdscpRatVerifier {
    /// Opaque driver payload
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Re-attestation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdscpReRat {
    /// Free-form cause, informational only
    pub cause: String,
}

/// Application payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdscpData {
    /// Payload bytes
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,

    /// Sequence bit of the alternating bit protocol
    pub alternating_bit: bool,
}

/// Data acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdscpAck {
    /// Bit of the acknowledged Data message
    pub alternating_bit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dat_debug_redacts_token() {
        let dat = IdscpDat { token: b"secret-token".to_vec() };
        let rendered = format!("{dat:?}");

        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("12 bytes"));
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(IdscpMessage::DatExpired.kind(), MessageKind::DatExpired);
        assert_eq!(IdscpMessage::ack(true).kind(), MessageKind::Ack);
        assert_eq!(IdscpMessage::data(vec![1], false).kind(), MessageKind::Data);
        assert_eq!(IdscpMessage::close(CloseCause::Timeout, "t").kind(), MessageKind::Close);
    }
}
