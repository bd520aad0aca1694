//! Upper-layer listener recording what a session delivered.

use std::sync::atomic::{AtomicUsize, Ordering};

use idscp_core::ConnectionListener;
use parking_lot::Mutex;

/// Records payloads and lifecycle callbacks.
#[derive(Default)]
pub struct RecordingListener {
    messages: Mutex<Vec<Vec<u8>>>,
    errors: Mutex<Vec<String>>,
    established: AtomicUsize,
    closed: AtomicUsize,
}

impl RecordingListener {
    /// Payloads received so far, in order.
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.messages.lock().clone()
    }

    /// Transport errors reported so far.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    /// How often `on_established` was called.
    pub fn established_count(&self) -> usize {
        self.established.load(Ordering::SeqCst)
    }

    /// How often `on_close` was called.
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ConnectionListener for RecordingListener {
    fn on_message(&self, data: Vec<u8>) {
        self.messages.lock().push(data);
    }

    fn on_established(&self) {
        self.established.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, error: String) {
        self.errors.lock().push(error);
    }

    fn on_close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
