use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use super::{Connector, Outbound, TransportError, TransportEvent, TransportSession};
use crate::telemetry::logging::dump_head;

pub mod config;

const CLOSE_FLUSH: Duration = Duration::from_secs(1);

/// Binary-frame websocket sessions over `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &Url) -> Result<TransportSession, TransportError> {
        debug!(target: "place::transport", url = %redacted(url), "opening websocket");
        let (ws_stream, response) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Handshake(err.to_string()))?;
        debug!(
            target: "place::transport",
            status = %response.status(),
            "websocket handshake complete"
        );

        let (tx_out, rx_out) = mpsc::unbounded_channel();
        let (tx_in, rx_in) = mpsc::unbounded_channel();
        tokio::spawn(handle_websocket(ws_stream, rx_out, tx_in));

        Ok(TransportSession {
            outbound: tx_out,
            inbound: rx_in,
        })
    }
}

async fn handle_websocket(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<Outbound>,
    tx_in: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                outbound = rx_out.recv() => match outbound {
                    Some(Outbound::Frame(data)) => {
                        if ws_sender.send(Message::Binary(data.to_vec())).await.is_err() {
                            return;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "".into(),
                        };
                        let _ = ws_sender.send(Message::Close(Some(frame))).await;
                        return;
                    }
                },
                _ = &mut stop_rx => {
                    // Flushes the close reply queued when the peer's Close was read.
                    let _ = ws_sender.close().await;
                    return;
                }
            }
        }
    });

    let mut closed = None;
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Binary(data)) => {
                if tx_in.send(TransportEvent::Frame(Bytes::from(data))).is_err() {
                    break;
                }
            }
            Ok(Message::Text(text)) => {
                trace!(
                    target: "place::transport",
                    dump = %dump_head(text.as_bytes()),
                    "ignoring text frame"
                );
            }
            Ok(Message::Close(frame)) => {
                closed = Some(match frame {
                    Some(frame) => TransportEvent::Closed {
                        code: Some(u16::from(frame.code)),
                        reason: frame.reason.into_owned(),
                    },
                    None => TransportEvent::Closed {
                        code: None,
                        reason: String::new(),
                    },
                });
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(target: "place::transport", error = %err, "websocket read failed");
                closed = Some(TransportEvent::Error(err.to_string()));
                break;
            }
        }
    }

    let _ = tx_in.send(closed.unwrap_or(TransportEvent::Closed {
        code: None,
        reason: String::new(),
    }));

    let _ = stop_tx.send(());
    if timeout(CLOSE_FLUSH, &mut send_task).await.is_err() {
        debug!(target: "place::transport", "close reply not flushed in time");
        send_task.abort();
    }
}

/// Endpoint without its query string; the query carries the captcha token.
fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
