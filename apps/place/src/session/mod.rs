//! Session lifecycle for the shared canvas server.
//!
//! [`ConnectionManager`] is owned by a single task. Connection attempts run on
//! spawned tasks and report back through one internal channel, tagged with the
//! attempt's generation; anything from a superseded generation is discarded.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected
//!                                   |
//!                                close() -> Closing -> Disconnected
//! ```

pub mod close;
pub mod notice;
pub mod resync;

pub use close::CloseKind;
pub use notice::{Notice, NoticeLevel};

use bytes::Bytes;
use place_proto::wire::{self, Command, PixelRecord, WireMessage};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::identity::Identity;
use crate::telemetry::logging::dump_head;
use crate::transport::websocket::config::endpoint_url;
use crate::transport::{Connector, Outbound, TransportError, TransportEvent, TransportSession};

const NOTICE_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no identity set; call start or connect first")]
    NoIdentity,
    #[error("failed to open session: {0}")]
    Connect(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Not delivered: a handshake was in flight or the link had gone away.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Pixel(PixelRecord),
    /// Packed full-canvas payload, still 6 bits per cell.
    Snapshot(Bytes),
    Notice(Notice),
    Closed(CloseKind),
}

struct LinkEvent {
    generation: u64,
    kind: LinkKind,
}

enum LinkKind {
    Opened(mpsc::UnboundedSender<Outbound>),
    Failed(TransportError),
    Transport(TransportEvent),
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    server: Url,
    identity: Option<Identity>,
    state: ConnectionState,
    generation: u64,
    link: Option<mpsc::UnboundedSender<Outbound>>,
    attempt: Option<JoinHandle<()>>,
    links_tx: mpsc::UnboundedSender<LinkEvent>,
    links_rx: mpsc::UnboundedReceiver<LinkEvent>,
    /// Written as soon as the in-flight attempt opens.
    deferred: Option<Bytes>,
    pending: VecDeque<SessionEvent>,
    resync_period: Duration,
    resync: Option<Interval>,
    notices: broadcast::Sender<Notice>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, server: Url) -> Self {
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            connector,
            server,
            identity: None,
            state: ConnectionState::Disconnected,
            generation: 0,
            link: None,
            attempt: None,
            links_tx,
            links_rx,
            deferred: None,
            pending: VecDeque::new(),
            resync_period: resync::DEFAULT_PERIOD,
            resync: None,
            notices,
        }
    }

    pub fn with_resync_period(mut self, period: Duration) -> Self {
        self.resync_period = period.max(resync::MIN_PERIOD);
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Identifier of the newest connection attempt; only ever grows.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Stores the identity, arms the periodic resync and requests the first
    /// snapshot, opening the session on the way.
    pub async fn start(&mut self, identity: Identity) -> Result<SendOutcome, SessionError> {
        self.identity = Some(identity);
        self.arm_resync();
        self.send(Bytes::copy_from_slice(&wire::snapshot_request()))
            .await
    }

    /// Replaces any current session with a fresh one for `identity` and
    /// resolves once it is open.
    pub async fn connect(&mut self, identity: Identity) -> Result<(), SessionError> {
        self.identity = Some(identity);
        self.connect_stored().await
    }

    /// Starts a new attempt without waiting for it. The outcome arrives
    /// through [`next_event`](Self::next_event). Returns the attempt's
    /// generation.
    pub fn reconnect(&mut self) -> Result<u64, SessionError> {
        self.begin_connect(None)
    }

    /// Writes `frame` on the live session. Without one, a new session is
    /// opened first. While a handshake is in flight the frame is dropped and
    /// never retried.
    pub async fn send(&mut self, frame: Bytes) -> Result<SendOutcome, SessionError> {
        match self.state {
            ConnectionState::Connected => Ok(self.write(frame)),
            ConnectionState::Connecting => {
                debug!(
                    target: "place::session",
                    len = frame.len(),
                    generation = self.generation,
                    "dropping frame while handshake is in flight"
                );
                Ok(SendOutcome::Dropped)
            }
            ConnectionState::Disconnected | ConnectionState::Closing => {
                self.connect_stored().await?;
                Ok(self.write(frame))
            }
        }
    }

    /// Client-initiated shutdown. No notice is raised for the resulting close.
    pub fn close(&mut self) {
        match self.state {
            ConnectionState::Connected => {
                if let Some(link) = &self.link {
                    let _ = link.send(Outbound::Close);
                }
                self.state = ConnectionState::Closing;
            }
            ConnectionState::Connecting => {
                self.abandon_attempt();
                self.state = ConnectionState::Disconnected;
            }
            ConnectionState::Closing | ConnectionState::Disconnected => {}
        }
        self.deferred = None;
        debug!(target: "place::session", state = ?self.state, "close requested");
    }

    /// Next session event. Cancellation safe; nothing is lost if the future
    /// is dropped before completion.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            tokio::select! {
                Some(link) = self.links_rx.recv() => {
                    if let Some(event) = self.on_link(link) {
                        return Some(event);
                    }
                }
                _ = next_tick(&mut self.resync) => self.on_resync_tick(),
                else => return None,
            }
        }
    }

    async fn connect_stored(&mut self) -> Result<(), SessionError> {
        let generation = self.begin_connect(None)?;
        loop {
            let Some(link) = self.links_rx.recv().await else {
                return Err(SessionError::Connect(TransportError::Handshake(
                    "link channel closed".into(),
                )));
            };
            if link.generation != generation {
                self.discard_stale(link);
                continue;
            }
            match link.kind {
                LinkKind::Opened(outbound) => {
                    self.on_opened(outbound);
                    self.pending.push_back(SessionEvent::Connected);
                    return Ok(());
                }
                LinkKind::Failed(err) => {
                    let event = self.on_failed(&err);
                    self.pending.push_back(event);
                    return Err(SessionError::Connect(err));
                }
                LinkKind::Transport(event) => {
                    // Forwarders post Opened before any transport event.
                    trace!(target: "place::session", ?event, "transport event before open");
                }
            }
        }
    }

    fn begin_connect(&mut self, deferred: Option<Bytes>) -> Result<u64, SessionError> {
        let identity = self.identity.clone().ok_or(SessionError::NoIdentity)?;
        if let Some(link) = self.link.take() {
            let _ = link.send(Outbound::Close);
        }
        self.abandon_attempt();

        self.generation += 1;
        let generation = self.generation;
        self.state = ConnectionState::Connecting;
        self.deferred = deferred;

        let url = endpoint_url(&self.server, &identity);
        let connector = Arc::clone(&self.connector);
        let links = self.links_tx.clone();
        info!(
            target: "place::session",
            generation,
            nick = %identity.nick,
            "connecting"
        );
        self.attempt = Some(tokio::spawn(async move {
            match connector.open(&url).await {
                Ok(TransportSession {
                    outbound,
                    mut inbound,
                }) => {
                    let opened = LinkEvent {
                        generation,
                        kind: LinkKind::Opened(outbound),
                    };
                    if links.send(opened).is_err() {
                        return;
                    }
                    while let Some(event) = inbound.recv().await {
                        let forwarded = LinkEvent {
                            generation,
                            kind: LinkKind::Transport(event),
                        };
                        if links.send(forwarded).is_err() {
                            break;
                        }
                    }
                }
                Err(err) => {
                    let _ = links.send(LinkEvent {
                        generation,
                        kind: LinkKind::Failed(err),
                    });
                }
            }
        }));
        Ok(generation)
    }

    /// Orphans the in-flight attempt so its late outcome is ignored.
    fn abandon_attempt(&mut self) {
        if let Some(task) = self.attempt.take() {
            task.abort();
        }
        self.generation += 1;
    }

    fn on_link(&mut self, link: LinkEvent) -> Option<SessionEvent> {
        if link.generation != self.generation {
            self.discard_stale(link);
            return None;
        }
        match link.kind {
            LinkKind::Opened(outbound) => {
                self.on_opened(outbound);
                Some(SessionEvent::Connected)
            }
            LinkKind::Failed(err) => Some(self.on_failed(&err)),
            LinkKind::Transport(TransportEvent::Frame(bytes)) => self.on_frame(bytes),
            LinkKind::Transport(TransportEvent::Error(error)) => {
                warn!(target: "place::session", %error, "transport error");
                self.on_closed(CloseKind::Abnormal, "")
            }
            LinkKind::Transport(TransportEvent::Closed { code, reason }) => {
                self.on_closed(CloseKind::classify(code), &reason)
            }
        }
    }

    fn discard_stale(&mut self, link: LinkEvent) {
        trace!(
            target: "place::session",
            stale = link.generation,
            current = self.generation,
            "discarding event from superseded attempt"
        );
        if let LinkKind::Opened(outbound) = link.kind {
            let _ = outbound.send(Outbound::Close);
        }
    }

    fn on_opened(&mut self, outbound: mpsc::UnboundedSender<Outbound>) {
        self.link = Some(outbound);
        self.state = ConnectionState::Connected;
        info!(target: "place::session", generation = self.generation, "connected");
        if let Some(frame) = self.deferred.take() {
            self.write(frame);
        }
    }

    fn on_failed(&mut self, err: &TransportError) -> SessionEvent {
        warn!(target: "place::session", error = %err, "connection attempt failed");
        self.state = ConnectionState::Disconnected;
        self.link = None;
        self.attempt = None;
        self.deferred = None;
        self.notify(Notice::error(notice::CONNECTION_ERROR))
    }

    fn on_closed(&mut self, kind: CloseKind, reason: &str) -> Option<SessionEvent> {
        self.link = None;
        self.attempt = None;
        // Later events from this link are noise.
        self.generation += 1;

        if self.state == ConnectionState::Closing {
            self.state = ConnectionState::Disconnected;
            debug!(target: "place::session", code = kind.code(), "session closed by client");
            return Some(SessionEvent::Closed(kind));
        }
        self.state = ConnectionState::Disconnected;
        info!(target: "place::session", code = kind.code(), reason, "session closed");

        if kind.reconnects() {
            if let Err(err) = self.begin_connect(None) {
                warn!(target: "place::session", error = %err, "cannot reconnect after expiry");
            }
        } else if let Some(notice) = kind.notice() {
            let event = self.notify(notice);
            self.pending.push_back(event);
        }
        Some(SessionEvent::Closed(kind))
    }

    fn on_frame(&mut self, bytes: Bytes) -> Option<SessionEvent> {
        let len = bytes.len();
        let raw = bytes.clone();
        match wire::decode(bytes) {
            WireMessage::Control { code } => match Command::from_code(code) {
                Some(Command::TooSoon) => Some(self.notify(Notice::error(notice::TOO_FAST))),
                _ => {
                    debug!(target: "place::session", code, "ignoring control frame");
                    None
                }
            },
            WireMessage::PixelUpdate(record) => match record.command() {
                Some(Command::SetColor) => Some(SessionEvent::Pixel(record)),
                // Rate-limited paints may come back as the echoed record.
                Some(Command::TooSoon) => Some(self.notify(Notice::error(notice::TOO_FAST))),
                _ => {
                    debug!(target: "place::session", code = record.code, "ignoring pixel frame");
                    None
                }
            },
            WireMessage::FullImage(payload) => {
                debug!(target: "place::session", len, "snapshot received");
                Some(SessionEvent::Snapshot(payload))
            }
            WireMessage::Invalid { len } => {
                debug!(target: "place::session", len, "dropping frame of unexpected length");
                trace!(target: "place::session", dump = %dump_head(&raw), "rejected frame");
                None
            }
        }
    }

    fn on_resync_tick(&mut self) {
        let request = Bytes::copy_from_slice(&wire::snapshot_request());
        match self.state {
            ConnectionState::Connected => {
                debug!(target: "place::session", "periodic resync");
                self.write(request);
            }
            ConnectionState::Connecting => {
                debug!(target: "place::session", "resync skipped; handshake in flight");
            }
            ConnectionState::Disconnected | ConnectionState::Closing => {
                debug!(target: "place::session", "resync reopening session");
                if let Err(err) = self.begin_connect(Some(request)) {
                    warn!(target: "place::session", error = %err, "resync cannot connect");
                }
            }
        }
    }

    fn write(&mut self, frame: Bytes) -> SendOutcome {
        let Some(link) = &self.link else {
            return SendOutcome::Dropped;
        };
        if tracing::enabled!(target: "place::session", tracing::Level::TRACE) {
            trace!(target: "place::session", len = frame.len(), dump = %dump_head(&frame), "send");
        }
        match link.send(Outbound::Frame(frame)) {
            Ok(()) => SendOutcome::Sent,
            Err(_) => {
                warn!(target: "place::session", "session writer gone; frame dropped");
                SendOutcome::Dropped
            }
        }
    }

    fn notify(&self, notice: Notice) -> SessionEvent {
        let _ = self.notices.send(notice.clone());
        SessionEvent::Notice(notice)
    }

    fn arm_resync(&mut self) {
        let delay = resync::first_resync_in(self.resync_period);
        let mut interval = tokio::time::interval_at(Instant::now() + delay, self.resync_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(
            target: "place::session",
            first_in_secs = delay.as_secs(),
            period_secs = self.resync_period.as_secs(),
            "resync armed"
        );
        self.resync = Some(interval);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.attempt.take() {
            task.abort();
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockConnector, MockHandshake};

    fn manager() -> (ConnectionManager, mpsc::UnboundedReceiver<MockHandshake>) {
        let (connector, handshakes) = MockConnector::new();
        let server = Url::parse("ws://127.0.0.1:9/ws").unwrap();
        (ConnectionManager::new(Arc::new(connector), server), handshakes)
    }

    #[tokio::test]
    async fn send_without_identity_fails() {
        let (mut manager, _handshakes) = manager();
        let err = manager.send(Bytes::from_static(&[2])).await.unwrap_err();
        assert!(matches!(err, SessionError::NoIdentity));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn failed_handshake_raises_connection_error() {
        let (mut manager, mut handshakes) = manager();
        let mut notices = manager.subscribe_notices();
        let (result, _) = tokio::join!(manager.connect(Identity::new("n", "c")), async {
            handshakes.recv().await.unwrap().reject("refused");
        });
        assert!(matches!(result, Err(SessionError::Connect(_))));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(
            notices.recv().await.unwrap(),
            Notice::error("Connection Error, please refresh")
        );
        assert_eq!(
            manager.next_event().await,
            Some(SessionEvent::Notice(Notice::error(notice::CONNECTION_ERROR)))
        );
    }

    #[tokio::test]
    async fn superseded_attempt_never_becomes_live() {
        let (mut manager, mut handshakes) = manager();
        manager.identity = Some(Identity::new("n", "c"));
        let first = manager.reconnect().unwrap();
        let stale = handshakes.recv().await.unwrap();
        let second = manager.reconnect().unwrap();
        assert!(second > first);

        let current = handshakes.recv().await.unwrap();
        let mut stale_peer = stale.accept();
        let _peer = current.accept();
        assert_eq!(manager.next_event().await, Some(SessionEvent::Connected));
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.generation(), second);

        // Nobody holds the stale session's writer any more.
        assert_eq!(stale_peer.next_outbound().await, None);
    }

    #[tokio::test]
    async fn too_soon_control_frame_raises_notice() {
        let (mut manager, mut handshakes) = manager();
        let (result, peer) = tokio::join!(manager.connect(Identity::new("n", "c")), async {
            handshakes.recv().await.unwrap().accept()
        });
        result.unwrap();
        assert_eq!(manager.next_event().await, Some(SessionEvent::Connected));

        peer.push(&[0]);
        peer.push(&[1, 2, 3]);
        peer.push(&[0b0000_0111, 0xFF, 0, 0b0000_0001]);
        assert_eq!(
            manager.next_event().await,
            Some(SessionEvent::Notice(Notice::error(notice::TOO_FAST)))
        );
        let Some(SessionEvent::Pixel(record)) = manager.next_event().await else {
            panic!("expected pixel update");
        };
        assert_eq!((record.color, record.x, record.y), (1, 1023, 0));
    }

    #[tokio::test]
    async fn too_soon_pixel_echo_raises_notice() {
        let (mut manager, mut handshakes) = manager();
        let (result, peer) = tokio::join!(manager.connect(Identity::new("n", "c")), async {
            handshakes.recv().await.unwrap().accept()
        });
        result.unwrap();
        assert_eq!(manager.next_event().await, Some(SessionEvent::Connected));

        let mut echo = wire::encode_paint(&PixelRecord::paint(7, 7, 7).unwrap());
        echo[3] &= 0b1100_0000;
        peer.push(&echo);
        assert_eq!(
            manager.next_event().await,
            Some(SessionEvent::Notice(Notice::error(notice::TOO_FAST)))
        );
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn rejected_frame_is_dumped_at_trace() {
        let (mut manager, _handshakes) = manager();
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let event = tracing::subscriber::with_default(subscriber, || {
            manager.on_frame(Bytes::from_static(&[0xde, 0xad, 0x42]))
        });
        assert_eq!(event, None);
        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("rejected frame"), "{logs}");
        assert!(logs.contains("de ad 42"), "{logs}");
    }

    #[tokio::test]
    async fn client_close_is_silent() {
        let (mut manager, mut handshakes) = manager();
        let mut notices = manager.subscribe_notices();
        let (result, mut peer) = tokio::join!(manager.connect(Identity::new("n", "c")), async {
            handshakes.recv().await.unwrap().accept()
        });
        result.unwrap();
        assert_eq!(manager.next_event().await, Some(SessionEvent::Connected));

        manager.close();
        assert_eq!(manager.state(), ConnectionState::Closing);
        assert_eq!(peer.next_outbound().await, Some(Outbound::Close));
        peer.close(1000, "");
        assert_eq!(
            manager.next_event().await,
            Some(SessionEvent::Closed(CloseKind::Other(1000)))
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(notices.try_recv().is_err());
    }
}
