//! In-memory secure channel.
//!
//! [`loopback_pair`] returns two connected endpoints. Each endpoint owns a
//! delivery thread that hands inbound frames to the attached
//! [`SecureChannelListener`] in order, the way a transport's reader thread
//! would. Frames may block there while the receiving session has not
//! started its handshake; the sender never blocks.

use std::{
    io,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
};

use idscp_core::{SecureChannel, SecureChannelListener};
use idscp_proto::IdscpMessage;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};

enum Delivery {
    Frame(Vec<u8>),
    Error(String),
    Closed,
}

type ListenerSlot = Arc<RwLock<Option<Weak<dyn SecureChannelListener>>>>;

/// One endpoint of an in-memory channel.
pub struct LoopbackChannel {
    name: String,
    peer: UnboundedSender<Delivery>,
    listener: ListenerSlot,
    sent: Mutex<Vec<Vec<u8>>>,
    drop_next: AtomicUsize,
    fail_sends: AtomicBool,
    closed: AtomicBool,
}

/// Create two connected endpoints named `a` and `b`.
///
/// Spawns one delivery thread per endpoint. A thread ends once the other
/// endpoint closed or was dropped.
pub fn loopback_pair(
    a: impl Into<String>,
    b: impl Into<String>,
) -> io::Result<(Arc<LoopbackChannel>, Arc<LoopbackChannel>)> {
    let (to_a, a_inbox) = mpsc::unbounded_channel();
    let (to_b, b_inbox) = mpsc::unbounded_channel();

    let a = Arc::new(LoopbackChannel::new(a.into(), to_b));
    let b = Arc::new(LoopbackChannel::new(b.into(), to_a));

    a.spawn_delivery(a_inbox)?;
    b.spawn_delivery(b_inbox)?;
    Ok((a, b))
}

impl LoopbackChannel {
    fn new(name: String, peer: UnboundedSender<Delivery>) -> Self {
        Self {
            name,
            peer,
            listener: Arc::new(RwLock::new(None)),
            sent: Mutex::new(Vec::new()),
            drop_next: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn spawn_delivery(&self, inbox: UnboundedReceiver<Delivery>) -> io::Result<()> {
        let listener = Arc::clone(&self.listener);
        let name = self.name.clone();
        thread::Builder::new()
            .name(format!("loopback-{name}"))
            .spawn(move || deliver(&name, &listener, inbox))
            .map(drop)
    }

    /// Route inbound frames of this endpoint to `listener`.
    pub fn attach(&self, listener: Weak<dyn SecureChannelListener>) {
        *self.listener.write() = Some(listener);
    }

    /// Name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Silently lose the next `count` outbound frames.
    pub fn drop_next(&self, count: usize) {
        self.drop_next.store(count, Ordering::SeqCst);
    }

    /// Make every send fail with a broken pipe, or recover.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Report a transport error to the peer's session.
    pub fn inject_error(&self, error: impl Into<String>) {
        if self.peer.send(Delivery::Error(error.into())).is_err() {
            trace!(channel = %self.name, "peer gone, error not delivered");
        }
    }

    /// Whether [`SecureChannel::close`] was called on this endpoint.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Every frame this endpoint put on the wire, decoded. Dropped frames
    /// are not included.
    pub fn sent_messages(&self) -> Vec<IdscpMessage> {
        self.sent.lock().iter().filter_map(|frame| idscp_proto::decode(frame).ok()).collect()
    }
}

impl SecureChannel for LoopbackChannel {
    fn send(&self, frame: &[u8]) -> io::Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "loopback send failure injected"));
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "loopback closed"));
        }

        let dropped =
            self.drop_next.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if dropped.is_ok() {
            debug!(channel = %self.name, len = frame.len(), "frame dropped");
            return Ok(());
        }

        self.sent.lock().push(frame.to_vec());
        self.peer
            .send(Delivery::Frame(frame.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "loopback peer gone"))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(channel = %self.name, "closing loopback");
        if self.peer.send(Delivery::Closed).is_err() {
            trace!(channel = %self.name, "peer already gone");
        }
    }
}

fn deliver(name: &str, listener: &ListenerSlot, mut inbox: UnboundedReceiver<Delivery>) {
    while let Some(delivery) = inbox.blocking_recv() {
        let target = listener.read().as_ref().and_then(Weak::upgrade);
        let Some(target) = target else {
            warn!(channel = %name, "no listener attached, delivery dropped");
            continue;
        };

        match delivery {
            Delivery::Frame(frame) => target.on_bytes(&frame),
            Delivery::Error(error) => target.on_error(&error),
            Delivery::Closed => {
                target.on_closed();
                break;
            },
        }
    }
    trace!(channel = %name, "delivery thread finished");
}
