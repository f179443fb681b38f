//! Mock transport for testing and the loopback daemon

use async_trait::async_trait;
use rocc_api::Message;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

use crate::{Transport, TransportError, TransportEvent, TransportResult};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock transport.
///
/// Records every dispatched message. When linked to a peer (see
/// [`MockTransport::pair`] and [`MockTransport::loopback`]) dispatched
/// messages are also delivered to the peer's inbound stream.
pub struct MockTransport {
    dispatched: Arc<Mutex<Vec<Message>>>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    event_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>>,
    peer_tx: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,

    /// Configure dispatch to fail with a route failure
    pub fail_dispatch: Arc<Mutex<bool>>,

    /// Configure dispatch to fail with an overload failure
    pub overloaded: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            dispatched: Arc::new(Mutex::new(Vec::new())),
            event_tx: tx,
            event_rx: Arc::new(Mutex::new(Some(rx))),
            peer_tx: Mutex::new(None),
            fail_dispatch: Arc::new(Mutex::new(false)),
            overloaded: Arc::new(Mutex::new(false)),
        }
    }

    /// Transport whose dispatched messages come back on its own stream
    pub fn loopback() -> Self {
        let transport = Self::new();
        *guard(&transport.peer_tx) = Some(transport.event_tx.clone());
        transport
    }

    /// Two transports wired back to back: what one dispatches, the other receives
    pub fn pair() -> (Self, Self) {
        let a = Self::new();
        let b = Self::new();
        *guard(&a.peer_tx) = Some(b.event_tx.clone());
        *guard(&b.peer_tx) = Some(a.event_tx.clone());
        (a, b)
    }

    /// Simulate a message arriving from a peer
    pub fn inject_inbound(&self, message: Message) {
        let _ = self.event_tx.send(TransportEvent::Inbound(message));
    }

    /// Messages dispatched so far
    pub fn dispatched(&self) -> Vec<Message> {
        guard(&self.dispatched).clone()
    }

    /// Drain the dispatched messages
    pub fn take_dispatched(&self) -> Vec<Message> {
        std::mem::take(&mut *guard(&self.dispatched))
    }

    pub fn set_fail_dispatch(&self, fail: bool) {
        *guard(&self.fail_dispatch) = fail;
    }

    pub fn set_overloaded(&self, overloaded: bool) {
        *guard(&self.overloaded) = overloaded;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn dispatch(&self, message: Message) -> TransportResult<()> {
        if *guard(&self.fail_dispatch) {
            return Err(TransportError::Route("Mock route failure".into()));
        }
        if *guard(&self.overloaded) {
            return Err(TransportError::Overload("Mock overload".into()));
        }

        trace!(
            command_code = message.command_code,
            is_request = message.is_request,
            "Mock dispatch"
        );
        guard(&self.dispatched).push(message.clone());

        if let Some(peer) = guard(&self.peer_tx).as_ref() {
            let _ = peer.send(TransportEvent::Inbound(message));
        }

        Ok(())
    }

    fn subscribe(&self) -> TransportResult<mpsc::UnboundedReceiver<TransportEvent>> {
        guard(&self.event_rx)
            .take()
            .ok_or_else(|| TransportError::Internal("subscribe() can only be called once".into()))
    }
}
