//! Transport traits

use async_trait::async_trait;
use rocc_api::Message;
use rocc_util::RoError;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from dispatching a message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No route or peer for the destination
    #[error("Route failure: {0}")]
    Route(String),

    /// Peer or local queue is overloaded
    #[error("Overload: {0}")]
    Overload(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TransportError> for RoError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Route(msg) => RoError::RouteFailure(msg),
            TransportError::Overload(msg) => RoError::OverloadFailure(msg),
            TransportError::Internal(msg) => RoError::InternalFailure(msg),
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Events from the transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A decoded request or answer arrived from a peer
    Inbound(Message),
}

/// Transport trait - implemented by the peer layer
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message towards its destination.
    ///
    /// Returns once the message has been handed to the peer layer; answers
    /// arrive later through [`Transport::subscribe`].
    async fn dispatch(&self, message: Message) -> TransportResult<()>;

    /// Take the inbound event stream. Only one subscriber is supported.
    fn subscribe(&self) -> TransportResult<mpsc::UnboundedReceiver<TransportEvent>>;

    /// Optional: check if the transport is healthy
    fn is_healthy(&self) -> bool {
        true
    }
}
