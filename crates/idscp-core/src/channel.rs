//! Secure channel boundary.
//!
//! The encrypted transport underneath the protocol. It carries one encoded
//! protocol message per frame and reports inbound frames, errors, closure and
//! the peer's certificate back to a [`SecureChannelListener`] (the FSM).

use std::io;

/// Outbound half of the encrypted transport.
///
/// Implementations must not call back into the FSM from `send` or `close`;
/// both may be invoked while the transition lock is held.
pub trait SecureChannel: Send + Sync + 'static {
    /// Send one encoded protocol message.
    fn send(&self, frame: &[u8]) -> io::Result<()>;

    /// Close the transport. Called at most once per session, off the
    /// transition lock.
    fn close(&self);
}

/// Inbound callbacks from the encrypted transport.
pub trait SecureChannelListener: Send + Sync {
    /// A frame arrived from the peer.
    ///
    /// May block while the session has not started its handshake yet.
    fn on_bytes(&self, frame: &[u8]);

    /// The transport failed.
    fn on_error(&self, error: &str);

    /// The transport was closed by the peer or the network.
    fn on_closed(&self);

    /// The peer presented its certificate during the transport handshake.
    fn on_peer_identity(&self, certificate: Vec<u8>);
}
