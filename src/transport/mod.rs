//! Transport binding consumed by the dispatcher.
//!
//! A [`Transport`] moves [`Envelope`]s between endpoints. It owns peer
//! identity and serialization; the dispatcher only asks it to emit to a peer,
//! to list the peers it can currently reach, and to deliver inbound envelopes
//! to a sink.
//!
//! [`local::LocalBus`] is an in-process implementation wiring one hub to any
//! number of spokes over `may` channels.

pub mod local;

use crate::envelope::Envelope;
use crate::error::TransportError;
use crate::ids::PeerId;
use std::sync::Arc;

pub use local::{HubLink, LocalBus, SpokeLink};

/// Callback receiving inbound envelopes together with the sending peer.
pub type InboundSink = Arc<dyn Fn(PeerId, Envelope) + Send + Sync>;

/// One endpoint's view of the underlying channel.
pub trait Transport: Send + Sync {
    /// Hand `envelope` to `peer`. Ownership of the envelope moves to the
    /// transport.
    ///
    /// # Errors
    ///
    /// [`TransportError::PeerUnavailable`] when `peer` is not reachable, and
    /// [`TransportError::Disconnected`] once this endpoint has been cut off.
    fn emit(&self, peer: PeerId, envelope: Envelope) -> Result<(), TransportError>;

    /// Peers currently reachable from this endpoint.
    fn peers(&self) -> Vec<PeerId>;

    /// Start delivering inbound envelopes to `sink`.
    ///
    /// An endpoint has a single inbound stream; subscribing again replaces the
    /// previous sink.
    fn subscribe(&self, sink: InboundSink);
}
