//! In-process hub/spoke transport.
//!
//! Every endpoint owns a mailbox: a `may` channel plus a pump coroutine that
//! drains it into the endpoint's [`InboundSink`]. The hub's mailbox is shared
//! by all spokes; each spoke's mailbox is fed only by the hub. Disconnecting
//! a spoke drops the hub's sender for it, so its pump drains what is queued
//! and exits.

use super::{InboundSink, Transport};
use crate::envelope::Envelope;
use crate::error::TransportError;
use crate::ids::PeerId;
use crate::runtime_config::{spawn_coroutine, RuntimeConfig};
use may::sync::mpsc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, error, info};

type Frame = (PeerId, Envelope);

struct Mailbox {
    owner: PeerId,
    rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    sink: Arc<RwLock<Option<InboundSink>>>,
}

impl Mailbox {
    fn new(owner: PeerId, rx: mpsc::Receiver<Frame>) -> Self {
        Self {
            owner,
            rx: Mutex::new(Some(rx)),
            sink: Arc::new(RwLock::new(None)),
        }
    }

    /// Install `sink` and start the pump on first use.
    fn subscribe(&self, sink: InboundSink, stack_size: usize) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);

        let Some(rx) = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            debug!(peer = %self.owner, "Inbound sink replaced");
            return;
        };

        let owner = self.owner;
        let slot = Arc::clone(&self.sink);
        let spawned = spawn_coroutine(&format!("brrtbus-pump-{owner}"), stack_size, move || {
            debug!(peer = %owner, "Inbound pump started");
            while let Ok((from, envelope)) = rx.recv() {
                let sink = slot
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                let Some(sink) = sink else {
                    continue;
                };
                let path = envelope.path.clone();
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink(from, envelope)))
                    .is_err()
                {
                    error!(peer = %owner, from = %from, path = %path, "Inbound sink panicked");
                }
            }
            debug!(peer = %owner, "Inbound pump stopped");
        });
        if spawned.is_err() {
            error!(peer = %owner, "Inbound pump not started; envelopes will queue");
        }
    }
}

struct BusInner {
    hub_tx: mpsc::Sender<Frame>,
    hub_mailbox: Mailbox,
    spokes: RwLock<BTreeMap<PeerId, mpsc::Sender<Frame>>>,
    next_peer: AtomicU64,
    stack_size: usize,
}

impl BusInner {
    fn is_connected(&self, peer: PeerId) -> bool {
        self.spokes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&peer)
    }
}

/// One hub and any number of spokes inside a single process.
///
/// ```rust
/// use brrtbus::transport::{LocalBus, Transport};
///
/// let bus = LocalBus::new();
/// let spoke = bus.connect_spoke();
/// assert_eq!(bus.hub_link().peers(), vec![spoke.id()]);
/// bus.disconnect(spoke.id());
/// assert!(spoke.peers().is_empty());
/// ```
#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<BusInner>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBus {
    /// Create a bus whose pumps use the stack size from [`RuntimeConfig`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_stack_size(RuntimeConfig::from_env().stack_size)
    }

    #[must_use]
    pub fn with_stack_size(stack_size: usize) -> Self {
        let (hub_tx, hub_rx) = mpsc::channel();
        Self {
            inner: Arc::new(BusInner {
                hub_tx,
                hub_mailbox: Mailbox::new(PeerId::HUB, hub_rx),
                spokes: RwLock::new(BTreeMap::new()),
                next_peer: AtomicU64::new(1),
                stack_size,
            }),
        }
    }

    /// The hub's end of the bus.
    #[must_use]
    pub fn hub_link(&self) -> HubLink {
        HubLink {
            bus: Arc::clone(&self.inner),
        }
    }

    /// Attach a new spoke and return its end of the bus.
    #[must_use]
    pub fn connect_spoke(&self) -> SpokeLink {
        let id = PeerId(self.inner.next_peer.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel();
        self.inner
            .spokes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        info!(peer = %id, "Spoke connected");
        SpokeLink {
            id,
            bus: Arc::clone(&self.inner),
            mailbox: Mailbox::new(id, rx),
        }
    }

    /// Detach `peer`. Returns `false` if it was not connected.
    pub fn disconnect(&self, peer: PeerId) -> bool {
        let removed = self
            .inner
            .spokes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&peer)
            .is_some();
        if removed {
            info!(peer = %peer, "Spoke disconnected");
        }
        removed
    }

    /// Connected spokes in connection order.
    #[must_use]
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.inner
            .spokes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

/// Hub endpoint: reaches every connected spoke.
#[derive(Clone)]
pub struct HubLink {
    bus: Arc<BusInner>,
}

impl Transport for HubLink {
    fn emit(&self, peer: PeerId, envelope: Envelope) -> Result<(), TransportError> {
        let spokes = self
            .bus
            .spokes
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let tx = spokes
            .get(&peer)
            .ok_or(TransportError::PeerUnavailable(peer))?;
        tx.send((PeerId::HUB, envelope))
            .map_err(|_| TransportError::PeerUnavailable(peer))
    }

    fn peers(&self) -> Vec<PeerId> {
        self.bus
            .spokes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn subscribe(&self, sink: InboundSink) {
        self.bus.hub_mailbox.subscribe(sink, self.bus.stack_size);
    }
}

/// Spoke endpoint: reaches the hub only, until disconnected.
pub struct SpokeLink {
    id: PeerId,
    bus: Arc<BusInner>,
    mailbox: Mailbox,
}

impl SpokeLink {
    /// This spoke's identity on the bus.
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.id
    }
}

impl Transport for SpokeLink {
    fn emit(&self, peer: PeerId, envelope: Envelope) -> Result<(), TransportError> {
        if !self.bus.is_connected(self.id) {
            return Err(TransportError::Disconnected);
        }
        if !peer.is_hub() {
            return Err(TransportError::PeerUnavailable(peer));
        }
        self.bus
            .hub_tx
            .send((self.id, envelope))
            .map_err(|_| TransportError::Disconnected)
    }

    fn peers(&self) -> Vec<PeerId> {
        if self.bus.is_connected(self.id) {
            vec![PeerId::HUB]
        } else {
            Vec::new()
        }
    }

    fn subscribe(&self, sink: InboundSink) {
        self.mailbox.subscribe(sink, self.bus.stack_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ArgVec, Headers};
    use std::time::Duration;

    fn envelope(path: &str) -> Envelope {
        Envelope::new(path, Headers::publish(), ArgVec::new())
    }

    fn recording_sink() -> (InboundSink, mpsc::Receiver<(PeerId, String)>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let sink: InboundSink = Arc::new(move |from: PeerId, env: Envelope| {
            let _ = tx.lock().unwrap().send((from, env.path));
        });
        (sink, rx)
    }

    #[test]
    fn test_spoke_to_hub_delivery() {
        let bus = LocalBus::with_stack_size(0x8000);
        let hub = bus.hub_link();
        let spoke = bus.connect_spoke();
        let (sink, rx) = recording_sink();
        hub.subscribe(sink);

        spoke.emit(PeerId::HUB, envelope("ping")).unwrap();
        let (from, path) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(from, spoke.id());
        assert_eq!(path, "ping");
    }

    #[test]
    fn test_hub_to_spoke_delivery_and_unknown_peer() {
        let bus = LocalBus::with_stack_size(0x8000);
        let hub = bus.hub_link();
        let spoke = bus.connect_spoke();
        let (sink, rx) = recording_sink();
        spoke.subscribe(sink);

        hub.emit(spoke.id(), envelope("pong")).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            (PeerId::HUB, "pong".to_string())
        );
        assert_eq!(
            hub.emit(PeerId(99), envelope("x")),
            Err(TransportError::PeerUnavailable(PeerId(99)))
        );
    }

    #[test]
    fn test_disconnect_cuts_both_directions() {
        let bus = LocalBus::with_stack_size(0x8000);
        let hub = bus.hub_link();
        let a = bus.connect_spoke();
        let b = bus.connect_spoke();
        assert_eq!(bus.peer_ids(), vec![a.id(), b.id()]);

        assert!(bus.disconnect(a.id()));
        assert!(!bus.disconnect(a.id()));
        assert_eq!(hub.peers(), vec![b.id()]);
        assert!(a.peers().is_empty());
        assert_eq!(
            a.emit(PeerId::HUB, envelope("x")),
            Err(TransportError::Disconnected)
        );
        assert_eq!(
            hub.emit(a.id(), envelope("x")),
            Err(TransportError::PeerUnavailable(a.id()))
        );
    }

    #[test]
    fn test_spoke_cannot_address_other_spokes() {
        let bus = LocalBus::with_stack_size(0x8000);
        let a = bus.connect_spoke();
        let b = bus.connect_spoke();
        assert_eq!(
            a.emit(b.id(), envelope("x")),
            Err(TransportError::PeerUnavailable(b.id()))
        );
    }
}
