//! libp2p-based transport for the consensus wire protocol.
//!
//! Real P2P networking using gossipsub for message propagation. Consensus
//! messages (spec §6, [`consensus::Message`]) are wrapped in an [`Envelope`]
//! and published on a single topic; gossipsub has no native unicast, so a
//! directed [`send`](Network::send) is expressed as an envelope addressed to
//! one recipient that every other peer silently drops on receipt. Broadcast
//! and HydraChain's own gossip-heavy traffic pattern (votes, proposals,
//! readiness beacons) are the common case; directed sends (sync responses)
//! are the exception this trades off against.

use crate::error::NetworkError;
use crate::network_trait::Network;
use crate::peer::PeerId;
use async_trait::async_trait;
use consensus::Message;
use futures::StreamExt;
use libp2p::{
    gossipsub::{self, IdentTopic, MessageAuthenticity, MessageId},
    identify, mdns, noise,
    swarm::{NetworkBehaviour, SwarmEvent},
    tcp, yamux, Multiaddr, Swarm,
};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Gossipsub topic carrying every consensus wire command.
const TOPIC_CONSENSUS: &str = "unykorn/consensus/1.0.0";

/// Wire envelope: `to = None` means broadcast, `to = Some(id)` means every
/// peer but `id` should drop it on receipt.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Envelope {
    to: Option<[u8; 32]>,
    message: Message,
}

/// Combined network behaviour.
#[derive(NetworkBehaviour)]
struct UnykornBehaviour {
    /// Gossipsub for message propagation
    gossipsub: gossipsub::Behaviour,
    /// mDNS for local peer discovery
    mdns: mdns::tokio::Behaviour,
    /// Identify for peer information exchange
    identify: identify::Behaviour,
}

/// libp2p-based implementation of [`Network`].
///
/// Owns the swarm outright: the node's event loop drives inbound traffic by
/// awaiting [`next_message`](Self::next_message) in a `tokio::select!` arm
/// alongside [`send`](Network::send)/[`broadcast`](Network::broadcast) calls
/// on the same `&mut self`, so there is no separate background task to hand
/// outbound messages to.
pub struct Libp2pNetwork {
    /// The libp2p swarm
    swarm: Swarm<UnykornBehaviour>,
    /// Consensus topic
    topic: IdentTopic,
    /// Our own identity, in POPEYE's `PeerId` representation
    local_id: PeerId,
}

impl Libp2pNetwork {
    /// Create a new libp2p network listening on `listen_addr`.
    pub async fn new(listen_addr: std::net::SocketAddr) -> Result<Self, NetworkError> {
        let topic = IdentTopic::new(TOPIC_CONSENSUS);

        let message_id_fn = |message: &gossipsub::Message| {
            let mut hasher = DefaultHasher::new();
            message.data.hash(&mut hasher);
            MessageId::from(hasher.finish().to_be_bytes().to_vec())
        };

        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(Duration::from_secs(1))
            .validation_mode(gossipsub::ValidationMode::Strict)
            .message_id_fn(message_id_fn)
            .build()
            .map_err(|e| NetworkError::ConfigError(e.to_string()))?;

        let mut swarm = libp2p::SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(tcp::Config::default(), noise::Config::new, yamux::Config::default)
            .map_err(|e| NetworkError::TransportError(e.to_string()))?
            .with_behaviour(|key| {
                let gossipsub = gossipsub::Behaviour::new(
                    MessageAuthenticity::Signed(key.clone()),
                    gossipsub_config,
                )
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

                let mdns = mdns::tokio::Behaviour::new(mdns::Config::default(), key.public().to_peer_id())?;

                let identify = identify::Behaviour::new(
                    identify::Config::new("/unykorn/1.0.0".to_string(), key.public())
                        .with_agent_version("unykorn/0.1.0".to_string()),
                );

                Ok(UnykornBehaviour { gossipsub, mdns, identify })
            })
            .map_err(|e| NetworkError::BehaviourError(e.to_string()))?
            .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
            .build();

        swarm
            .behaviour_mut()
            .gossipsub
            .subscribe(&topic)
            .map_err(|e| NetworkError::SubscriptionError(e.to_string()))?;

        let multiaddr: Multiaddr = format!("/ip4/{}/tcp/{}", listen_addr.ip(), listen_addr.port())
            .parse()
            .map_err(|e: libp2p::multiaddr::Error| NetworkError::InvalidAddress(e.to_string()))?;
        swarm.listen_on(multiaddr).map_err(|e| NetworkError::ListenError(e.to_string()))?;

        let local_id = peer_id_from_libp2p(swarm.local_peer_id());
        info!(peer = %local_id, "libp2p identity");

        Ok(Self { swarm, topic, local_id })
    }

    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    pub fn peer_count(&self) -> usize {
        self.swarm.network_info().num_peers()
    }

    /// Connect to a bootstrap peer.
    pub fn dial(&mut self, addr: Multiaddr) -> Result<(), NetworkError> {
        self.swarm.dial(addr).map_err(|e| NetworkError::DialError(e.to_string()))
    }

    /// Wait for the next consensus message addressed to us, handling (and
    /// logging) every other swarm event along the way. Intended for a
    /// `tokio::select!` arm in the node's event loop.
    pub async fn next_message(&mut self) -> (PeerId, Message) {
        loop {
            let event = self.swarm.select_next_some().await;
            match self.handle_swarm_event(event) {
                Ok(Some(pair)) => return pair,
                Ok(None) => continue,
                Err(e) => warn!(%e, "error handling swarm event"),
            }
        }
    }

    fn handle_swarm_event(
        &mut self,
        event: SwarmEvent<UnykornBehaviourEvent>,
    ) -> Result<Option<(PeerId, Message)>, NetworkError> {
        match event {
            SwarmEvent::Behaviour(UnykornBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                message,
                ..
            })) => self.handle_gossip_message(message),
            SwarmEvent::Behaviour(UnykornBehaviourEvent::Mdns(mdns::Event::Discovered(peers))) => {
                for (peer_id, addr) in peers {
                    debug!(%peer_id, %addr, "mdns discovered peer");
                    self.swarm.behaviour_mut().gossipsub.add_explicit_peer(&peer_id);
                }
                Ok(None)
            }
            SwarmEvent::Behaviour(UnykornBehaviourEvent::Mdns(mdns::Event::Expired(peers))) => {
                for (peer_id, _addr) in peers {
                    debug!(%peer_id, "mdns peer expired");
                    self.swarm.behaviour_mut().gossipsub.remove_explicit_peer(&peer_id);
                }
                Ok(None)
            }
            SwarmEvent::Behaviour(UnykornBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                debug!(%peer_id, agent = %info.agent_version, "identified peer");
                Ok(None)
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                info!(%peer_id, "connected");
                Ok(None)
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                info!(%peer_id, "disconnected");
                Ok(None)
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "listening");
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn handle_gossip_message(
        &mut self,
        message: gossipsub::Message,
    ) -> Result<Option<(PeerId, Message)>, NetworkError> {
        let envelope: Envelope =
            bincode::deserialize(&message.data).map_err(|e| NetworkError::DeserializationError(e.to_string()))?;

        if let Some(to) = envelope.to {
            if to != self.local_id.0 {
                return Ok(None);
            }
        }

        let from = message
            .source
            .map(|p| peer_id_from_libp2p(&p))
            .unwrap_or_else(|| PeerId::new([0u8; 32]));

        Ok(Some((from, envelope.message)))
    }

    fn publish(&mut self, envelope: Envelope) -> Result<(), NetworkError> {
        let data = bincode::serialize(&envelope).map_err(|e| NetworkError::SerializationError(e.to_string()))?;
        self.swarm
            .behaviour_mut()
            .gossipsub
            .publish(self.topic.clone(), data)
            .map_err(|e| NetworkError::PublishError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Network for Libp2pNetwork {
    async fn send(&mut self, peer: PeerId, message: Message) -> Result<(), NetworkError> {
        self.publish(Envelope { to: Some(peer.0), message })
    }

    async fn broadcast(&mut self, message: Message, _exclude: Option<PeerId>) -> Result<(), NetworkError> {
        self.publish(Envelope { to: None, message })
    }

    async fn on_wire_protocol_start(&mut self, _peer: PeerId) -> Result<(), NetworkError> {
        Ok(())
    }
}

/// Convert a libp2p `PeerId` to our 32-byte representation.
fn peer_id_from_libp2p(peer_id: &libp2p::PeerId) -> PeerId {
    let bytes = peer_id.to_bytes();
    let mut result = [0u8; 32];
    let len = bytes.len().min(32);
    result[..len].copy_from_slice(&bytes[..len]);
    PeerId::new(result)
}
