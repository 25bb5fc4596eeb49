//! The `Network` trait (spec §6): the interface consensus's driver uses to
//! move [`consensus::Message`]s between validators. POPEYE never inspects a
//! message's contents beyond its command id — routing and gossip only,
//! validation stays in TEV/consensus.

use crate::error::NetworkError;
use crate::peer::PeerId;
use async_trait::async_trait;
use consensus::Message;

/// Transport for the consensus wire protocol. `LoopbackNetwork` (in-process,
/// for deterministic multi-node tests) and `Libp2pNetwork` (gossipsub) both
/// implement this.
#[async_trait]
pub trait Network: Send {
    /// Send `message` to exactly one peer.
    async fn send(&mut self, peer: PeerId, message: Message) -> Result<(), NetworkError>;

    /// Send `message` to every known peer except `exclude` (typically the
    /// message's original sender, to avoid an immediate echo).
    async fn broadcast(&mut self, message: Message, exclude: Option<PeerId>) -> Result<(), NetworkError>;

    /// Called once a peer's transport-level handshake completes, before any
    /// consensus `Status`/`Ready` exchange. Gives the transport a chance to
    /// register the peer; consensus handles the protocol handshake itself.
    async fn on_wire_protocol_start(&mut self, peer: PeerId) -> Result<(), NetworkError>;
}
