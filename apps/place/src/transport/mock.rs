//! In-process connector whose server side is driven by tests.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use url::Url;

use super::{Connector, Outbound, TransportError, TransportEvent, TransportSession};

/// Every `open` call surfaces as a [`MockHandshake`] on the paired receiver
/// and stays pending until the test accepts or rejects it.
#[derive(Clone)]
pub struct MockConnector {
    handshakes: mpsc::UnboundedSender<MockHandshake>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockHandshake>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { handshakes: tx }, rx)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, url: &Url) -> Result<TransportSession, TransportError> {
        let (respond, decision) = oneshot::channel();
        self.handshakes
            .send(MockHandshake {
                url: url.clone(),
                respond,
            })
            .map_err(|_| TransportError::Handshake("mock server gone".into()))?;
        decision
            .await
            .map_err(|_| TransportError::Handshake("handshake abandoned".into()))?
    }
}

pub struct MockHandshake {
    pub url: Url,
    respond: oneshot::Sender<Result<TransportSession, TransportError>>,
}

impl MockHandshake {
    pub fn accept(self) -> MockPeer {
        let (tx_out, rx_out) = mpsc::unbounded_channel();
        let (tx_in, rx_in) = mpsc::unbounded_channel();
        let _ = self.respond.send(Ok(TransportSession {
            outbound: tx_out,
            inbound: rx_in,
        }));
        MockPeer {
            from_client: rx_out,
            to_client: tx_in,
        }
    }

    pub fn reject(self, reason: &str) {
        let _ = self
            .respond
            .send(Err(TransportError::Handshake(reason.to_string())));
    }

    pub fn query(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

/// Server half of an accepted mock session.
pub struct MockPeer {
    pub from_client: mpsc::UnboundedReceiver<Outbound>,
    pub to_client: mpsc::UnboundedSender<TransportEvent>,
}

impl MockPeer {
    pub fn push(&self, frame: &[u8]) {
        let _ = self
            .to_client
            .send(TransportEvent::Frame(Bytes::copy_from_slice(frame)));
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(TransportEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    pub fn fail(&self, error: &str) {
        let _ = self.to_client.send(TransportEvent::Error(error.to_string()));
    }

    /// `None` once the client dropped its side.
    pub async fn next_outbound(&mut self) -> Option<Outbound> {
        self.from_client.recv().await
    }

    /// Frames already written by the client, without waiting.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(item) = self.from_client.try_recv() {
            out.push(item);
        }
        out
    }
}
