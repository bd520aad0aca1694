//! World state after a scenario's handshakes.

use std::{collections::HashMap, sync::Arc};

use idscp_core::{Fsm, FsmState};
use tokio::runtime::Runtime;

use crate::{LoopbackChannel, RecordingListener, StaticDaps};

/// One side of a scenario.
pub struct Peer {
    name: String,
    fsm: Arc<Fsm>,
    channel: Arc<LoopbackChannel>,
    daps: Arc<StaticDaps>,
    listener: Arc<RecordingListener>,
}

impl Peer {
    pub(crate) fn new(
        name: String,
        fsm: Arc<Fsm>,
        channel: Arc<LoopbackChannel>,
        daps: Arc<StaticDaps>,
        listener: Arc<RecordingListener>,
    ) -> Self {
        Self { name, fsm, channel, daps, listener }
    }

    /// Name given in the scenario.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The peer's session.
    pub fn fsm(&self) -> &Arc<Fsm> {
        &self.fsm
    }

    /// The peer's end of the loopback channel.
    pub fn channel(&self) -> &LoopbackChannel {
        &self.channel
    }

    /// The peer's token service.
    pub fn daps(&self) -> &StaticDaps {
        &self.daps
    }

    /// Callbacks the peer's session delivered.
    pub fn listener(&self) -> &RecordingListener {
        &self.listener
    }

    /// Current state of the peer's session.
    pub fn state(&self) -> FsmState {
        self.fsm.state()
    }
}

/// Both peers, their handshake outcomes and the runtime driving their
/// timers.
pub struct World {
    peers: Vec<Peer>,
    handshakes: HashMap<String, Result<(), String>>,
    _runtime: Runtime,
}

impl World {
    pub(crate) fn new(
        peers: Vec<Peer>,
        handshakes: HashMap<String, Result<(), String>>,
        runtime: Runtime,
    ) -> Self {
        Self { peers, handshakes, _runtime: runtime }
    }

    /// Peer by name.
    pub fn peer(&self, name: &str) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.name == name)
    }

    /// Every peer, in declaration order.
    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    /// Outcome of the peer's `start_handshake` call.
    pub fn handshake(&self, name: &str) -> Option<&Result<(), String>> {
        self.handshakes.get(name)
    }

    /// Peer by name, or an error naming the missing peer.
    pub fn require(&self, name: &str) -> Result<&Peer, String> {
        self.peer(name).ok_or_else(|| format!("peer {name} not found"))
    }
}
