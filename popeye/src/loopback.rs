//! In-process transport for deterministic multi-node tests (spec §6).
//!
//! No sockets, no serialization round-trip: every node in a test shares one
//! [`LoopbackHub`] and gets its own [`LoopbackNetwork`] handle. Messages sent
//! to a peer land directly in that peer's inbox, in send order, which is
//! exactly the ordering guarantee §5 asks of "per-peer ordering only".

use crate::error::NetworkError;
use crate::network_trait::Network;
use crate::peer::PeerId;
use async_trait::async_trait;
use consensus::Message;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type Inbox = mpsc::UnboundedSender<(PeerId, Message)>;

/// Shared switchboard every [`LoopbackNetwork`] in a test registers with.
#[derive(Default)]
pub struct LoopbackHub {
    inboxes: Mutex<HashMap<PeerId, Inbox>>,
}

impl LoopbackHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// One node's handle onto a [`LoopbackHub`].
pub struct LoopbackNetwork {
    hub: Arc<LoopbackHub>,
    id: PeerId,
    rx: mpsc::UnboundedReceiver<(PeerId, Message)>,
}

impl LoopbackNetwork {
    pub fn new(hub: &Arc<LoopbackHub>, id: PeerId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        hub.inboxes.lock().expect("loopback hub mutex poisoned").insert(id, tx);
        Self { hub: hub.clone(), id, rx }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Receive the next `(sender, message)` pair addressed to this node.
    pub async fn recv(&mut self) -> Option<(PeerId, Message)> {
        self.rx.recv().await
    }
}

#[async_trait]
impl Network for LoopbackNetwork {
    async fn send(&mut self, peer: PeerId, message: Message) -> Result<(), NetworkError> {
        let inboxes = self.hub.inboxes.lock().expect("loopback hub mutex poisoned");
        let tx = inboxes.get(&peer).ok_or_else(|| NetworkError::PeerNotFound(peer.to_string()))?;
        tx.send((self.id, message)).map_err(|_| NetworkError::ChannelClosed)
    }

    async fn broadcast(&mut self, message: Message, exclude: Option<PeerId>) -> Result<(), NetworkError> {
        let inboxes = self.hub.inboxes.lock().expect("loopback hub mutex poisoned");
        for (peer, tx) in inboxes.iter() {
            if *peer == self.id || Some(*peer) == exclude {
                continue;
            }
            // Best-effort: a peer that has dropped its receiver is gone,
            // not a broadcast failure.
            let _ = tx.send((self.id, message.clone()));
        }
        Ok(())
    }

    async fn on_wire_protocol_start(&mut self, _peer: PeerId) -> Result<(), NetworkError> {
        Ok(())
    }
}
