use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use url::Url;

pub mod mock;
pub mod websocket;

pub use mock::{MockConnector, MockHandshake, MockPeer};
pub use websocket::WebSocketConnector;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid server url {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Client-to-server instruction for a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Bytes),
    Close,
}

/// Server-to-client signal, delivered in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(Bytes),
    Error(String),
    /// `code` is `None` when the peer vanished without a close frame.
    Closed { code: Option<u16>, reason: String },
}

/// Channel pair for one opened session. Dropping `outbound` closes the
/// session; `inbound` ends after the final `Closed` or `Error`.
#[derive(Debug)]
pub struct TransportSession {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens byte-frame sessions to a server endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &Url) -> Result<TransportSession, TransportError>;
}
