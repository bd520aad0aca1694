//! FSM events.
//!
//! An event is either an internal control signal (raised by the user API,
//! a timer, the transport or an attestation driver) or a protocol message
//! received from the peer. Events are immutable once constructed.

use idscp_proto::{IdscpMessage, MessageKind};

/// Internal control signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    /// User started the handshake
    StartHandshake,
    /// User wants to send application data (message attached)
    SendData,
    /// Re-attest the peer (user request or attestation timer)
    RepeatRat,
    /// Close the session (user request or transport closed)
    IdscpStop,
    /// The transport reported an error
    Error,
    /// Handshake or attestation driver timer expired
    Timeout,
    /// The peer's token is no longer valid
    DatTimerExpired,
    /// No Ack arrived in time for the buffered Data
    AckTimerExpired,
    /// Local prover finished successfully
    RatProverOk,
    /// Local prover failed
    RatProverFailed,
    /// Local prover emitted a message for the peer (message attached)
    RatProverMsg,
    /// Local verifier accepted the peer
    RatVerifierOk,
    /// Local verifier rejected the peer
    RatVerifierFailed,
    /// Local verifier emitted a message for the peer (message attached)
    RatVerifierMsg,
}

impl ControlSignal {
    /// Every control signal.
    pub const ALL: [Self; 14] = [
        Self::StartHandshake,
        Self::SendData,
        Self::RepeatRat,
        Self::IdscpStop,
        Self::Error,
        Self::Timeout,
        Self::DatTimerExpired,
        Self::AckTimerExpired,
        Self::RatProverOk,
        Self::RatProverFailed,
        Self::RatProverMsg,
        Self::RatVerifierOk,
        Self::RatVerifierFailed,
        Self::RatVerifierMsg,
    ];
}

/// Input to a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Internal control signal, optionally carrying an outbound message
    Control {
        /// The signal
        signal: ControlSignal,
        /// Message attached by the signal's source
        message: Option<IdscpMessage>,
    },
    /// Protocol message received from the peer
    Message(IdscpMessage),
}

impl Event {
    /// A control event without attachment.
    pub const fn control(signal: ControlSignal) -> Self {
        Self::Control { signal, message: None }
    }

    /// A control event carrying a message.
    pub const fn with_message(signal: ControlSignal, message: IdscpMessage) -> Self {
        Self::Control { signal, message: Some(message) }
    }

    /// Transition key of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Control { signal, .. } => EventKind::Control(*signal),
            Self::Message(message) => EventKind::Message(message.kind()),
        }
    }

    /// The message carried by this event, inbound or attached.
    pub fn message(&self) -> Option<&IdscpMessage> {
        match self {
            Self::Control { message, .. } => message.as_ref(),
            Self::Message(message) => Some(message),
        }
    }
}

/// Discriminant of an [`Event`], used as the key of a transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Control signal
    Control(ControlSignal),
    /// Inbound message kind
    Message(MessageKind),
}

impl From<ControlSignal> for EventKind {
    fn from(signal: ControlSignal) -> Self {
        Self::Control(signal)
    }
}

impl From<MessageKind> for EventKind {
    fn from(kind: MessageKind) -> Self {
        Self::Message(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_of_control_ignores_attachment() {
        let bare = Event::control(ControlSignal::SendData);
        let loaded =
            Event::with_message(ControlSignal::SendData, IdscpMessage::data(vec![7], false));

        assert_eq!(bare.kind(), loaded.kind());
        assert_eq!(bare.message(), None);
        assert!(loaded.message().is_some());
    }

    #[test]
    fn kind_of_inbound_is_message_kind() {
        let event = Event::Message(IdscpMessage::DatExpired);
        assert_eq!(event.kind(), EventKind::Message(MessageKind::DatExpired));
    }
}
